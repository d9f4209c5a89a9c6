//! # World Queries
//!
//! The physics boundary of the locomotion core.
//!
//! ## Design
//!
//! The simulation never owns collision geometry. It asks two read-only
//! questions through [`WorldQuery`] ("does this capsule / sphere overlap any
//! solid geometry on these layers?") and moves through [`CharacterMover`].
//! Trigger volumes never count as solid.
//!
//! [`StaticWorld`] is a box-only implementation used by the headless server
//! and by tests that need geometry at known distances.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::geometry::{Aabb, Capsule};

// ============================================================================
// Layer Mask
// ============================================================================

/// Bit set of collision layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Reflect)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const NONE: LayerMask = LayerMask(0);
    pub const ALL: LayerMask = LayerMask(u32::MAX);

    /// Generic static geometry.
    pub const DEFAULT: LayerMask = LayerMask(1 << 0);
    /// Walkable surfaces.
    pub const GROUND: LayerMask = LayerMask(1 << 1);
    /// Character bodies.
    pub const PLAYER: LayerMask = LayerMask(1 << 2);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn intersects(self, other: LayerMask) -> bool {
        self.0 & other.0 != 0
    }

    pub fn union(self, other: LayerMask) -> LayerMask {
        LayerMask(self.0 | other.0)
    }

    /// This mask with every layer of `other` removed.
    pub fn without(self, other: LayerMask) -> LayerMask {
        LayerMask(self.0 & !other.0)
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        LayerMask::DEFAULT
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// Read-only overlap queries against world geometry.
///
/// Implementations must ignore trigger volumes and any layer not in `mask`.
pub trait WorldQuery: Send + Sync {
    /// Does the capsule swept between sphere centers `point_a` and `point_b` overlap solid geometry?
    fn overlap_capsule(&self, point_a: Vec3, point_b: Vec3, radius: f32, mask: LayerMask) -> bool;

    /// Does the sphere overlap solid geometry?
    fn overlap_sphere(&self, center: Vec3, radius: f32, mask: LayerMask) -> bool;
}

/// Number of bisection steps used to find the last clear fraction of a blocked move.
const MOVE_BISECTION_STEPS: u32 = 12;

/// Collision-aware movement.
///
/// The provided `move_capsule` slides along each axis independently and stops
/// at the last clear fraction of a blocked axis.
pub trait CharacterMover: WorldQuery {
    /// Move `capsule` from `position` by `delta`; returns the resolved position.
    fn move_capsule(&self, capsule: &Capsule, position: Vec3, delta: Vec3, mask: LayerMask) -> Vec3 {
        let mut resolved = position;
        for axis in [Vec3::X, Vec3::Z, Vec3::Y] {
            let step = axis * delta.dot(axis);
            if step != Vec3::ZERO {
                resolved = sweep_axis(self, capsule, resolved, step, mask);
            }
        }
        resolved
    }
}

fn capsule_blocked<W: WorldQuery + ?Sized>(
    world: &W,
    capsule: &Capsule,
    position: Vec3,
    mask: LayerMask,
) -> bool {
    world.overlap_capsule(
        capsule.bottom_sphere(position),
        capsule.top_sphere(position),
        capsule.radius,
        mask,
    )
}

fn sweep_axis<W: WorldQuery + ?Sized>(
    world: &W,
    capsule: &Capsule,
    from: Vec3,
    step: Vec3,
    mask: LayerMask,
) -> Vec3 {
    if !capsule_blocked(world, capsule, from + step, mask) {
        return from + step;
    }
    // Already penetrating: refuse to move rather than sink further.
    if capsule_blocked(world, capsule, from, mask) {
        return from;
    }

    let (mut clear, mut blocked) = (0.0_f32, 1.0_f32);
    for _ in 0..MOVE_BISECTION_STEPS {
        let mid = (clear + blocked) * 0.5;
        if capsule_blocked(world, capsule, from + step * mid, mask) {
            blocked = mid;
        } else {
            clear = mid;
        }
    }
    from + step * clear
}

// ============================================================================
// Static World
// ============================================================================

/// One box collider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxCollider {
    pub bounds: Aabb,
    pub layers: LayerMask,
    /// Triggers never block.
    pub trigger: bool,
}

/// Box-only world geometry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticWorld {
    colliders: Vec<BoxCollider>,
}

/// Half extent of the floor slab added by [`StaticWorld::with_ground`].
const GROUND_HALF_EXTENT: f32 = 10_000.0;

/// Surfaces closer than `radius - CONTACT_TOLERANCE` overlap; touching does not.
const CONTACT_TOLERANCE: f32 = 1e-4;

impl StaticWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// World with a single floor slab whose top face sits at `height`.
    pub fn with_ground(height: f32) -> Self {
        let mut world = Self::new();
        world.add_box(
            Vec3::new(-GROUND_HALF_EXTENT, height - 1.0, -GROUND_HALF_EXTENT),
            Vec3::new(GROUND_HALF_EXTENT, height, GROUND_HALF_EXTENT),
            LayerMask::GROUND.union(LayerMask::DEFAULT),
        );
        world
    }

    /// Add a solid box.
    pub fn add_box(&mut self, min: Vec3, max: Vec3, layers: LayerMask) -> &mut Self {
        self.colliders.push(BoxCollider {
            bounds: Aabb::new(min, max),
            layers,
            trigger: false,
        });
        self
    }

    /// Add a trigger volume. Triggers are stored but never reported by queries.
    pub fn add_trigger(&mut self, min: Vec3, max: Vec3, layers: LayerMask) -> &mut Self {
        self.colliders.push(BoxCollider {
            bounds: Aabb::new(min, max),
            layers,
            trigger: true,
        });
        self
    }

    pub fn colliders(&self) -> &[BoxCollider] {
        &self.colliders
    }

    fn solids(&self, mask: LayerMask) -> impl Iterator<Item = &BoxCollider> {
        self.colliders
            .iter()
            .filter(move |c| !c.trigger && c.layers.intersects(mask))
    }
}

impl WorldQuery for StaticWorld {
    fn overlap_capsule(&self, point_a: Vec3, point_b: Vec3, radius: f32, mask: LayerMask) -> bool {
        self.solids(mask)
            .any(|c| c.bounds.distance_to_segment(point_a, point_b) < radius - CONTACT_TOLERANCE)
    }

    fn overlap_sphere(&self, center: Vec3, radius: f32, mask: LayerMask) -> bool {
        self.solids(mask)
            .any(|c| c.bounds.distance_to_point(center) < radius - CONTACT_TOLERANCE)
    }
}

impl CharacterMover for StaticWorld {}
