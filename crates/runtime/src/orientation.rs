//! Body yaw, camera yaw and camera pitch.
//!
//! Yaw is counter-clockwise about +Y in radians and unbounded; positive look
//! x turns right. Pitch is clamped. Outside aiming the camera yaw follows the
//! body; while aiming, look input drives the camera and the body turns toward
//! it at a limited rate.

use bevy::prelude::*;

use crate::config::LookConfig;

/// Scales the aim turn rate into a per-second interpolation factor.
const AIM_TURN_SCALE: f32 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct OrientationController {
    config: LookConfig,
    yaw: f32,
    camera_yaw: f32,
    pitch: f32,
}

impl OrientationController {
    pub fn new(config: &LookConfig, yaw: f32) -> Self {
        Self {
            config: *config,
            yaw,
            camera_yaw: yaw,
            pitch: 0.0,
        }
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn camera_yaw(&self) -> f32 {
        self.camera_yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn body_rotation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw)
    }

    /// Apply one step of look input.
    pub fn apply_look(&mut self, look: Vec2, aiming: bool, dt: f32) {
        let rate = self.config.sensitivity.to_radians() * dt;

        self.pitch = (self.pitch - look.y * rate).clamp(
            self.config.pitch_min_degrees.to_radians(),
            self.config.pitch_max_degrees.to_radians(),
        );

        if aiming {
            self.camera_yaw -= look.x * rate;
            let t = (dt * self.config.aim_turn_rate * AIM_TURN_SCALE).clamp(0.0, 1.0);
            self.yaw += shortest_angle(self.camera_yaw - self.yaw) * t;
        } else {
            self.yaw -= look.x * rate;
            self.camera_yaw = self.yaw;
        }
    }
}

/// Wrap an angle difference into `(-PI, PI]`.
fn shortest_angle(delta: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let wrapped = delta.rem_euclid(TAU);
    if wrapped > PI {
        wrapped - TAU
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn controller() -> OrientationController {
        OrientationController::new(&LookConfig::default(), 0.0)
    }

    #[test]
    fn test_positive_look_turns_right() {
        let mut look = controller();
        look.apply_look(Vec2::X, false, DT);
        let forward = look.body_rotation() * Vec3::NEG_Z;
        assert!(forward.x > 0.0);
        assert_eq!(look.camera_yaw(), look.yaw());
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut look = controller();
        for _ in 0..600 {
            look.apply_look(Vec2::new(0.0, -1.0), false, DT);
        }
        assert!((look.pitch() - 60f32.to_radians()).abs() < 1e-5);

        for _ in 0..600 {
            look.apply_look(Vec2::new(0.0, 1.0), false, DT);
        }
        assert!((look.pitch() + 30f32.to_radians()).abs() < 1e-5);
    }

    #[test]
    fn test_yaw_is_unbounded() {
        let mut look = controller();
        for _ in 0..600 {
            look.apply_look(Vec2::X, false, DT);
        }
        assert!(look.yaw().abs() > std::f32::consts::TAU);
    }

    #[test]
    fn test_aiming_body_chases_camera() {
        let mut look = controller();
        look.apply_look(Vec2::X * 6.0, true, DT);
        let camera = look.camera_yaw();
        assert!(camera < 0.0);
        assert!(look.yaw() > camera && look.yaw() < 0.0);

        let mut gap = (camera - look.yaw()).abs();
        for _ in 0..120 {
            look.apply_look(Vec2::ZERO, true, DT);
            let next = (look.camera_yaw() - look.yaw()).abs();
            assert!(next <= gap);
            gap = next;
        }
        assert!(gap < 1e-3);
    }

    #[test]
    fn test_shortest_angle_wraps() {
        use std::f32::consts::PI;
        assert!((shortest_angle(1.5 * PI) + 0.5 * PI).abs() < 1e-5);
        assert!((shortest_angle(-1.5 * PI) - 0.5 * PI).abs() < 1e-5);
    }
}
