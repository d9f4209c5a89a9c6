//! Ground contact: a sphere probe just below the capsule's bottom sphere.
//!
//! Each step's result stands on its own; there is no debouncing.

use bevy::prelude::*;
use frontlines_common::{Capsule, LayerMask, WorldQuery};

use crate::config::GroundConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct GroundDetector {
    mask: LayerMask,
    probe_offset: f32,
    probe_radius: Option<f32>,
}

impl GroundDetector {
    pub fn new(config: &GroundConfig) -> Self {
        Self {
            mask: config.mask,
            probe_offset: config.probe_offset,
            probe_radius: config.probe_radius,
        }
    }

    pub fn mask(&self) -> LayerMask {
        self.mask
    }

    /// Probe center: capsule center minus half height plus radius, minus the offset.
    pub fn probe_center(&self, capsule: &Capsule, position: Vec3) -> Vec3 {
        let y = position.y + capsule.center.y - capsule.height * 0.5 + capsule.radius - self.probe_offset;
        Vec3::new(position.x, y, position.z)
    }

    pub fn is_grounded<W: WorldQuery + ?Sized>(&self, world: &W, capsule: &Capsule, position: Vec3) -> bool {
        let radius = self.probe_radius.unwrap_or(capsule.radius);
        world.overlap_sphere(self.probe_center(capsule, position), radius, self.mask)
    }
}
