//! # Locomotion Configuration
//!
//! Tunables for every locomotion component. Defaults carry the canonical
//! gameplay constants.

use bevy::prelude::*;
use frontlines_common::LayerMask;
use serde::{Deserialize, Serialize};

use crate::error::{LocomotionError, LocomotionResult};

// ============================================================================
// Main Config
// ============================================================================

/// Full locomotion configuration.
///
/// Insert as a resource before spawning characters to override the defaults.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LocomotionConfig {
    pub movement: MovementConfig,
    pub stamina: StaminaConfig,
    pub stance: StanceConfig,
    pub ground: GroundConfig,
    pub dive: DiveConfig,
    pub look: LookConfig,
    pub jump: JumpConfig,
}

impl LocomotionConfig {
    /// Reject configurations the simulation cannot run with.
    pub fn validate(&self) -> LocomotionResult<()> {
        let stance = &self.stance;
        if stance.radius <= 0.0 {
            return Err(LocomotionError::InvalidConfig(format!(
                "capsule radius must be positive, got {}",
                stance.radius
            )));
        }
        for (name, height) in [
            ("standing", stance.standing_height),
            ("crouching", stance.crouching_height),
            ("prone", stance.prone_height),
        ] {
            if height < stance.radius * 2.0 {
                return Err(LocomotionError::InvalidConfig(format!(
                    "{name} height {height} is shorter than the capsule diameter"
                )));
            }
        }
        if !(stance.standing_height >= stance.crouching_height
            && stance.crouching_height >= stance.prone_height)
        {
            return Err(LocomotionError::InvalidConfig(
                "stance heights must satisfy standing >= crouching >= prone".to_string(),
            ));
        }
        if self.stamina.max <= 0.0 {
            return Err(LocomotionError::InvalidConfig(
                "max stamina must be positive".to_string(),
            ));
        }
        if let Some(radius) = self.ground.probe_radius {
            if radius <= 0.0 {
                return Err(LocomotionError::InvalidConfig(format!(
                    "ground probe radius must be positive, got {radius}"
                )));
            }
        }
        if self.dive.duration <= 0.0 {
            return Err(LocomotionError::InvalidConfig(
                "dive duration must be positive".to_string(),
            ));
        }
        if self.look.pitch_min_degrees > self.look.pitch_max_degrees {
            return Err(LocomotionError::InvalidConfig(
                "pitch range is inverted".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Movement
// ============================================================================

/// Horizontal speed and gravity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Reflect)]
#[serde(default)]
pub struct MovementConfig {
    /// Base walk speed (m/s)
    pub walk_speed: f32,
    pub sprint_multiplier: f32,
    pub crouch_multiplier: f32,
    pub prone_multiplier: f32,
    /// Move magnitude at or below which the character counts as idle
    pub deadzone: f32,
    /// Vertical acceleration (m/s², negative is down)
    pub gravity: f32,
    /// Vertical velocity held while grounded, keeps the character seated on slopes
    pub grounded_velocity: f32,
    /// Layers that block movement
    pub collision_mask: LayerMask,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            walk_speed: 5.0,
            sprint_multiplier: 1.6,
            crouch_multiplier: 0.5,
            prone_multiplier: 0.25,
            deadzone: 0.1,
            gravity: -9.81,
            grounded_velocity: -2.0,
            collision_mask: LayerMask::ALL.without(LayerMask::PLAYER),
        }
    }
}

// ============================================================================
// Stamina
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Reflect)]
#[serde(default)]
pub struct StaminaConfig {
    pub max: f32,
    /// Drain per second while sprinting and moving
    pub sprint_cost: f32,
    /// Deducted once when a dive starts
    pub dive_cost: f32,
    /// Regeneration per second
    pub regen_rate: f32,
    /// Seconds without use before regeneration starts
    pub regen_delay: f32,
}

impl Default for StaminaConfig {
    fn default() -> Self {
        Self {
            max: 100.0,
            sprint_cost: 10.0,
            dive_cost: 20.0,
            regen_rate: 5.0,
            regen_delay: 1.5,
        }
    }
}

// ============================================================================
// Stance
// ============================================================================

/// Capsule geometry per stance. Center heights for crouch and prone are
/// derived so the capsule keeps its feet on the pivot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Reflect)]
#[serde(default)]
pub struct StanceConfig {
    pub standing_height: f32,
    pub crouching_height: f32,
    pub prone_height: f32,
    /// Center of the standing capsule above the pivot
    pub standing_center: f32,
    pub radius: f32,
    /// Exponential blend rate toward standing/crouching geometry (1/s)
    pub crouch_blend_rate: f32,
    /// Exponential blend rate toward prone geometry (1/s)
    pub prone_blend_rate: f32,
    /// Shrinks the clearance probe so touching walls does not block standing up
    pub clearance_skin: f32,
    /// Layers that can block a taller stance
    pub obstruction_mask: LayerMask,
}

impl Default for StanceConfig {
    fn default() -> Self {
        Self {
            standing_height: 1.8,
            crouching_height: 0.9,
            prone_height: 0.4,
            standing_center: 0.9,
            radius: 0.2,
            crouch_blend_rate: 10.0,
            prone_blend_rate: 10.0,
            clearance_skin: 0.05,
            obstruction_mask: LayerMask::ALL.without(LayerMask::PLAYER),
        }
    }
}

// ============================================================================
// Ground
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Reflect)]
#[serde(default)]
pub struct GroundConfig {
    /// Layers that count as ground. Empty is a configuration fault.
    pub mask: LayerMask,
    /// How far below the capsule's bottom sphere the probe sits
    pub probe_offset: f32,
    /// Probe sphere radius; `None` uses the capsule radius
    pub probe_radius: Option<f32>,
}

impl Default for GroundConfig {
    fn default() -> Self {
        Self {
            mask: LayerMask::GROUND,
            probe_offset: 0.1,
            probe_radius: None,
        }
    }
}

// ============================================================================
// Dive
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Reflect)]
#[serde(default)]
pub struct DiveConfig {
    /// Horizontal dive speed (m/s), independent of walk speed
    pub force: f32,
    /// Seconds from dive start to prone
    pub duration: f32,
}

impl Default for DiveConfig {
    fn default() -> Self {
        Self {
            force: 8.0,
            duration: 0.5,
        }
    }
}

// ============================================================================
// Look
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Reflect)]
#[serde(default)]
pub struct LookConfig {
    /// Degrees per second per unit of look input
    pub sensitivity: f32,
    pub pitch_min_degrees: f32,
    pub pitch_max_degrees: f32,
    /// Body turn rate toward the camera while aiming
    pub aim_turn_rate: f32,
}

impl Default for LookConfig {
    fn default() -> Self {
        Self {
            sensitivity: 100.0,
            pitch_min_degrees: -30.0,
            pitch_max_degrees: 60.0,
            aim_turn_rate: 0.8,
        }
    }
}

// ============================================================================
// Jump
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Reflect)]
#[serde(default)]
pub struct JumpConfig {
    pub enabled: bool,
    /// Launch parameter fed to `sqrt(height * -2 * gravity)`
    pub height: f32,
}

impl Default for JumpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            height: 8.0,
        }
    }
}
