//! # Frontlines Runtime
//!
//! Authoritative character locomotion. Only the simulating side (the server)
//! runs anything in this crate; observers render replicated snapshots.
//!
//! ## Modules
//!
//! - [`stamina`]: depletable resource gating sprint and dive
//! - [`stance`]: capsule geometry per stance and the clearance check
//! - [`ground`]: sphere-probe ground contact
//! - [`state_machine`]: the seven-state locomotion machine
//! - [`motion`]: horizontal and vertical displacement
//! - [`orientation`]: body yaw, camera yaw and pitch
//! - [`locomotion`]: the per-character aggregate with its explicit lifecycle
//! - [`character`]: Bevy driver stepping characters in `FixedUpdate`
//! - [`physics`]: shared collision world resource
//! - [`replication`]: spawn/despawn and state sync with `frontlines-networking`
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Frontlines Runtime                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Locomotion (one per character)                                 │
//! │  ├── GroundDetector ── WorldQuery::overlap_sphere               │
//! │  ├── LocomotionMachine ── Stamina, StanceController clearance   │
//! │  ├── MotionIntegrator ── CharacterMover::move_capsule           │
//! │  └── OrientationController                                      │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Character Driver (FixedUpdate, LocomotionSet::Simulate)        │
//! │  ├── initialize + activate on spawn                             │
//! │  ├── CharacterInput -> step -> Transform, LocomotionReadout     │
//! │  └── configuration faults -> SimulationFault                    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Replication Sync (feature "networking")                        │
//! │  ├── NetworkSet::Receive -> Simulate -> NetworkSet::Publish     │
//! │  └── mirrored state -> LocomotionReadout on observers           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod character;
pub mod config;
pub mod error;
pub mod ground;
pub mod locomotion;
pub mod motion;
pub mod orientation;
pub mod physics;
pub mod stamina;
pub mod stance;
pub mod state_machine;

#[cfg(feature = "networking")]
pub mod replication;

pub use config::LocomotionConfig;
pub use error::{LocomotionError, LocomotionResult};
pub use locomotion::{Lifecycle, Locomotion, LocomotionReadout, StepReport};

use bevy::prelude::*;

// ============================================================================
// Runtime Plugin
// ============================================================================

/// Main runtime plugin.
///
/// Insert a [`physics::PhysicsWorld`] (and optionally a [`LocomotionConfig`])
/// before characters are spawned.
///
/// # Example
/// ```rust,ignore
/// use bevy::prelude::*;
/// use frontlines_common::StaticWorld;
/// use frontlines_runtime::{physics::PhysicsWorld, FrontlinesRuntimePlugin};
///
/// fn main() {
///     App::new()
///         .add_plugins(MinimalPlugins)
///         .insert_resource(PhysicsWorld::new(StaticWorld::with_ground(0.0)))
///         .add_plugins(FrontlinesRuntimePlugin)
///         .run();
/// }
/// ```
pub struct FrontlinesRuntimePlugin;

impl Plugin for FrontlinesRuntimePlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(character::LocomotionPlugin);

        #[cfg(feature = "networking")]
        app.add_plugins(replication::ReplicationSyncPlugin);

        info!("Frontlines Runtime initialized");
    }
}

// ============================================================================
// Prelude
// ============================================================================

/// Convenient re-exports for common runtime types.
pub mod prelude {
    pub use super::character::{
        character_bundle, spawn_character, CharacterController, LifecycleRequest,
        LocomotionPlugin, LocomotionSet, SimulationFault,
    };
    pub use super::config::{
        DiveConfig, GroundConfig, JumpConfig, LocomotionConfig, LookConfig, MovementConfig,
        StaminaConfig, StanceConfig,
    };
    pub use super::physics::PhysicsWorld;
    pub use super::state_machine::{StateChange, TransitionReason};
    pub use super::{
        FrontlinesRuntimePlugin, Lifecycle, Locomotion, LocomotionError, LocomotionReadout,
        LocomotionResult, StepReport,
    };

    #[cfg(feature = "networking")]
    pub use super::replication::{ReplicationSyncPlugin, SpawnLayout};
}
