//! # Motion Integrator
//!
//! Turns state, input and gravity into two independent displacements per
//! step: one horizontal, one vertical. Both go through the same move
//! primitive so a wall hit does not stop vertical settling and a floor hit
//! does not stop sliding.

use bevy::prelude::*;
use frontlines_common::{LocomotionState, TickInput};

use crate::config::{DiveConfig, JumpConfig, MovementConfig};

/// Speed multiplier for a state. `None` for Diving, which uses the dive force.
pub fn speed_multiplier(state: LocomotionState, movement: &MovementConfig) -> Option<f32> {
    match state {
        LocomotionState::Walking | LocomotionState::Aiming | LocomotionState::Climbing => Some(1.0),
        LocomotionState::Sprinting => Some(movement.sprint_multiplier),
        LocomotionState::Crouching => Some(movement.crouch_multiplier),
        LocomotionState::Prone => Some(movement.prone_multiplier),
        LocomotionState::Diving => None,
    }
}

/// Launch speed for a jump: `sqrt(height * -2 * gravity)`.
pub fn jump_velocity(height: f32, gravity: f32) -> f32 {
    (height * -2.0 * gravity).max(0.0).sqrt()
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotionIntegrator {
    movement: MovementConfig,
    dive: DiveConfig,
    jump: JumpConfig,
    vertical_velocity: f32,
}

impl MotionIntegrator {
    pub fn new(movement: &MovementConfig, dive: &DiveConfig, jump: &JumpConfig) -> Self {
        Self {
            movement: *movement,
            dive: *dive,
            jump: *jump,
            vertical_velocity: 0.0,
        }
    }

    pub fn vertical_velocity(&self) -> f32 {
        self.vertical_velocity
    }

    /// World-space direction of the move input relative to `rotation`.
    ///
    /// Forward is the body's -Z, right is +X. Zero when there is no input.
    pub fn input_direction(input: &TickInput, rotation: Quat) -> Vec3 {
        let forward = rotation * Vec3::NEG_Z;
        let right = rotation * Vec3::X;
        (right * input.move_axes.x + forward * input.move_axes.y).normalize_or_zero()
    }

    /// Horizontal displacement for this step.
    pub fn horizontal_displacement(
        &self,
        state: LocomotionState,
        input: &TickInput,
        rotation: Quat,
        dt: f32,
    ) -> Vec3 {
        match speed_multiplier(state, &self.movement) {
            Some(multiplier) => {
                Self::input_direction(input, rotation) * self.movement.walk_speed * multiplier * dt
            }
            None => {
                let direction = if input.move_axes.length() > self.movement.deadzone {
                    Self::input_direction(input, rotation)
                } else {
                    rotation * Vec3::NEG_Z
                };
                direction * self.dive.force * dt
            }
        }
    }

    /// Launch a jump if allowed. Returns whether it happened.
    pub fn try_jump(&mut self, state: LocomotionState, grounded: bool) -> bool {
        let allowed = matches!(
            state,
            LocomotionState::Walking | LocomotionState::Sprinting | LocomotionState::Aiming
        );
        if !self.jump.enabled || !grounded || !allowed {
            return false;
        }
        self.vertical_velocity = jump_velocity(self.jump.height, self.movement.gravity);
        true
    }

    /// Integrate gravity and return this step's vertical displacement.
    pub fn vertical_displacement(&mut self, grounded: bool, dt: f32) -> Vec3 {
        if grounded && self.vertical_velocity < 0.0 {
            self.vertical_velocity = self.movement.grounded_velocity;
        } else {
            self.vertical_velocity += self.movement.gravity * dt;
        }
        Vec3::Y * self.vertical_velocity * dt
    }

    /// Overwrite vertical velocity.
    pub fn set_vertical_velocity(&mut self, velocity: f32) {
        self.vertical_velocity = velocity;
    }
}
