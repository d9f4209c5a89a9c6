//! # Stance Geometry
//!
//! Per-stance capsule targets, exponential blending toward the active target,
//! and the clearance check that gates every transition to a taller stance.
//!
//! ## Design
//!
//! One routine, [`StanceController::can_assume`], answers "can I stand up",
//! "can I rise to a crouch" and "can I go prone". It sweeps a capsule from the
//! character's current lowest sphere to the candidate stance's highest sphere
//! and asks the world whether that volume is clear.

use bevy::prelude::*;
use frontlines_common::{Capsule, LayerMask, LocomotionState, Stance, WorldQuery};

use crate::config::StanceConfig;

/// Height, center and blend rate of one stance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StanceTarget {
    pub height: f32,
    pub center: f32,
    pub blend_rate: f32,
}

/// Gate used by the state machine before moving to a taller stance.
pub trait ClearanceCheck {
    fn can_assume(&self, stance: Stance) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct StanceController {
    config: StanceConfig,
    current_height: f32,
    current_center: f32,
}

impl StanceController {
    /// Starts in standing geometry.
    pub fn new(config: &StanceConfig) -> Self {
        Self {
            config: *config,
            current_height: config.standing_height,
            current_center: config.standing_center,
        }
    }

    pub fn current_height(&self) -> f32 {
        self.current_height
    }

    pub fn current_center(&self) -> f32 {
        self.current_center
    }

    pub fn radius(&self) -> f32 {
        self.config.radius
    }

    /// The capsule as it is right now.
    pub fn capsule(&self) -> Capsule {
        Capsule::new(
            Vec3::Y * self.current_center,
            self.current_height,
            self.config.radius,
        )
    }

    /// Target geometry of a stance. Crouch and prone centers drop by half the
    /// height difference so the feet stay put.
    pub fn target(&self, stance: Stance) -> StanceTarget {
        let config = &self.config;
        let center_for = |height: f32| config.standing_center - (config.standing_height - height) * 0.5;
        match stance {
            Stance::Standing => StanceTarget {
                height: config.standing_height,
                center: config.standing_center,
                blend_rate: config.crouch_blend_rate,
            },
            Stance::Crouching => StanceTarget {
                height: config.crouching_height,
                center: center_for(config.crouching_height),
                blend_rate: config.crouch_blend_rate,
            },
            Stance::Prone => StanceTarget {
                height: config.prone_height,
                center: center_for(config.prone_height),
                blend_rate: config.prone_blend_rate,
            },
        }
    }

    /// Blend current geometry toward the target of `state`.
    pub fn blend(&mut self, state: LocomotionState, dt: f32) {
        let target = self.target(state.stance());
        let t = (dt * target.blend_rate).clamp(0.0, 1.0);
        self.current_height += (target.height - self.current_height) * t;
        self.current_center += (target.center - self.current_center) * t;
    }

    /// Jump straight to a stance's geometry.
    pub fn snap_to(&mut self, stance: Stance) {
        let target = self.target(stance);
        self.current_height = target.height;
        self.current_center = target.center;
    }

    /// Is the volume between the current lowest sphere and `target`'s highest sphere clear?
    ///
    /// The probe is shrunk by the clearance skin and ignores the player layer.
    pub fn can_assume_taller<W: WorldQuery + ?Sized>(
        &self,
        world: &W,
        position: Vec3,
        target: StanceTarget,
    ) -> bool {
        let radius = self.config.radius;
        let bottom = self.capsule().bottom_sphere(position);
        let top = position + Vec3::Y * (target.center + (target.height * 0.5 - radius).max(0.0));
        let mask = self.config.obstruction_mask.without(LayerMask::PLAYER);

        !world.overlap_capsule(bottom, top, radius - self.config.clearance_skin, mask)
    }

    /// [`Self::can_assume_taller`] for a named stance.
    pub fn can_assume<W: WorldQuery + ?Sized>(&self, world: &W, position: Vec3, stance: Stance) -> bool {
        self.can_assume_taller(world, position, self.target(stance))
    }
}

/// Binds a stance controller to a world and position for one step.
pub struct StanceProbe<'a, W: ?Sized> {
    pub stance: &'a StanceController,
    pub world: &'a W,
    pub position: Vec3,
}

impl<W: WorldQuery + ?Sized> ClearanceCheck for StanceProbe<'_, W> {
    fn can_assume(&self, stance: Stance) -> bool {
        self.stance.can_assume(self.world, self.position, stance)
    }
}
