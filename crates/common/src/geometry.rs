//! Capsule and box geometry used by world queries.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Vertical character capsule, positioned relative to the character's pivot (its feet).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Reflect)]
pub struct Capsule {
    /// Offset of the capsule center from the pivot.
    pub center: Vec3,
    /// Total height including both hemispheres.
    pub height: f32,
    pub radius: f32,
}

impl Capsule {
    pub fn new(center: Vec3, height: f32, radius: f32) -> Self {
        Self {
            center,
            height,
            radius,
        }
    }

    /// Half the length of the inner segment. Zero when the capsule is a sphere.
    pub fn half_segment(&self) -> f32 {
        (self.height * 0.5 - self.radius).max(0.0)
    }

    /// Center of the lower hemisphere at `position`.
    pub fn bottom_sphere(&self, position: Vec3) -> Vec3 {
        position + self.center - Vec3::Y * self.half_segment()
    }

    /// Center of the upper hemisphere at `position`.
    pub fn top_sphere(&self, position: Vec3) -> Vec3 {
        position + self.center + Vec3::Y * self.half_segment()
    }
}

/// Axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Reflect)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Box from two corners in any order.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Euclidean distance from `point` to the box (zero inside).
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        point.distance(point.clamp(self.min, self.max))
    }

    /// Shortest distance between the segment `a..b` and the box.
    ///
    /// Distance to a convex set is convex along a segment, so a ternary
    /// search over the segment parameter finds the minimum.
    pub fn distance_to_segment(&self, a: Vec3, b: Vec3) -> f32 {
        let ab = b - a;
        if ab.length_squared() <= f32::EPSILON {
            return self.distance_to_point(a);
        }

        let (mut lo, mut hi) = (0.0_f32, 1.0_f32);
        for _ in 0..48 {
            let m1 = lo + (hi - lo) / 3.0;
            let m2 = hi - (hi - lo) / 3.0;
            if self.distance_to_point(a + ab * m1) <= self.distance_to_point(a + ab * m2) {
                hi = m2;
            } else {
                lo = m1;
            }
        }

        let best = self.distance_to_point(a + ab * ((lo + hi) * 0.5));
        best.min(self.distance_to_point(a)).min(self.distance_to_point(b))
    }
}
