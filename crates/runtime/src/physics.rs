//! # Physics World
//!
//! The world geometry characters collide with, exposed to systems as a
//! resource. Anything implementing [`CharacterMover`] can back it; the
//! headless server uses [`frontlines_common::StaticWorld`].
//!
//! Queries are read-only, so one handle is shared by every character.

use std::sync::Arc;

use bevy::prelude::*;
use frontlines_common::CharacterMover;

/// Shared collision world used by [`crate::character::step_characters`].
#[derive(Resource, Clone)]
pub struct PhysicsWorld(Arc<dyn CharacterMover>);

impl PhysicsWorld {
    pub fn new(mover: impl CharacterMover + 'static) -> Self {
        Self(Arc::new(mover))
    }

    pub fn mover(&self) -> &dyn CharacterMover {
        self.0.as_ref()
    }
}

impl std::fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PhysicsWorld").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frontlines_common::{Capsule, LayerMask, StaticWorld};

    #[test]
    fn test_shared_world_blocks_movement() {
        let mut geometry = StaticWorld::with_ground(0.0);
        geometry.add_box(
            Vec3::new(-5.0, 0.0, -2.0),
            Vec3::new(5.0, 3.0, -1.0),
            LayerMask::DEFAULT,
        );
        let physics = PhysicsWorld::new(geometry);
        let clone = physics.clone();

        let capsule = Capsule::new(Vec3::Y * 0.9, 1.8, 0.2);
        let resolved = clone.mover().move_capsule(
            &capsule,
            Vec3::new(0.0, 0.01, 0.0),
            Vec3::new(0.0, 0.0, -3.0),
            LayerMask::DEFAULT,
        );
        // Stopped against the wall face at z = -1 with the capsule radius in front.
        assert!(resolved.z > -0.81 && resolved.z < -0.79, "resolved {resolved:?}");
    }
}
