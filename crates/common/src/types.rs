//! Locomotion state and stance definitions shared by the simulation and the wire protocol.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

// ============================================================================
// Locomotion State
// ============================================================================

/// The seven locomotion states. Exactly one is active per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Reflect)]
pub enum LocomotionState {
    #[default]
    Walking,
    Sprinting,
    Crouching,
    Prone,
    /// Time-bounded; always ends in `Prone`.
    Diving,
    /// Reserved for ladder/ledge traversal. No transition produces it yet.
    Climbing,
    /// Modal overlay; restores the state it was entered from.
    Aiming,
}

impl LocomotionState {
    /// Capsule geometry this state blends toward.
    ///
    /// Diving keeps the standing capsule until the dive completes, at which
    /// point the character snaps to prone.
    pub fn stance(self) -> Stance {
        match self {
            LocomotionState::Crouching => Stance::Crouching,
            LocomotionState::Prone => Stance::Prone,
            LocomotionState::Walking
            | LocomotionState::Sprinting
            | LocomotionState::Diving
            | LocomotionState::Climbing
            | LocomotionState::Aiming => Stance::Standing,
        }
    }

    /// Short lowercase name, used in logs and status lines.
    pub fn as_str(self) -> &'static str {
        match self {
            LocomotionState::Walking => "walking",
            LocomotionState::Sprinting => "sprinting",
            LocomotionState::Crouching => "crouching",
            LocomotionState::Prone => "prone",
            LocomotionState::Diving => "diving",
            LocomotionState::Climbing => "climbing",
            LocomotionState::Aiming => "aiming",
        }
    }
}

impl std::fmt::Display for LocomotionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Stance
// ============================================================================

/// Capsule geometry class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Reflect)]
pub enum Stance {
    #[default]
    Standing,
    Crouching,
    Prone,
}
