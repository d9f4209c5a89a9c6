//! # Frontlines Common
//!
//! Shared types for the Frontlines locomotion runtime and networking layer.
//!
//! ## Modules
//!
//! - [`types`]: `LocomotionState` and `Stance`
//! - [`input`]: input samples, edge tracking, wire-level action kinds
//! - [`geometry`]: capsule and box math
//! - [`world`]: the world-query boundary and a box-only `StaticWorld`

pub mod geometry;
pub mod input;
pub mod types;
pub mod world;

pub use geometry::{Aabb, Capsule};
pub use input::{
    ActionEdge, ActionKind, ActionSet, CharacterInput, InputSample, InputTracker, TickInput,
};
pub use types::{LocomotionState, Stance};
pub use world::{CharacterMover, LayerMask, StaticWorld, WorldQuery};

// ============================================================================
// Prelude
// ============================================================================

/// Convenient re-exports for shared types.
pub mod prelude {
    pub use super::geometry::{Aabb, Capsule};
    pub use super::input::{
        ActionEdge, ActionKind, CharacterInput, InputSample, InputTracker, TickInput,
    };
    pub use super::types::{LocomotionState, Stance};
    pub use super::world::{CharacterMover, LayerMask, StaticWorld, WorldQuery};
}
