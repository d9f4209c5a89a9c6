//! # Stamina
//!
//! Depletable resource gating sprint and dive.
//!
//! `consume` floors at zero and restarts the regen delay. `tick` runs once per
//! step and regenerates only when nothing was consumed during that step and
//! the delay has elapsed.

use crate::config::StaminaConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct Stamina {
    current: f32,
    max: f32,
    regen_rate: f32,
    regen_delay: f32,
    time_since_use: f32,
    consumed_this_step: bool,
}

impl Stamina {
    pub fn new(config: &StaminaConfig) -> Self {
        Self {
            current: config.max,
            max: config.max,
            regen_rate: config.regen_rate,
            regen_delay: config.regen_delay,
            time_since_use: 0.0,
            consumed_this_step: false,
        }
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn time_since_use(&self) -> f32 {
        self.time_since_use
    }

    pub fn is_depleted(&self) -> bool {
        self.current <= 0.0
    }

    /// Fraction of max, in `[0, 1]`.
    pub fn fraction(&self) -> f32 {
        self.current / self.max
    }

    /// Spend `amount`, floored at zero. Restarts the regen delay.
    pub fn consume(&mut self, amount: f32) {
        if amount <= 0.0 {
            return;
        }
        self.current = (self.current - amount).max(0.0);
        self.time_since_use = 0.0;
        self.consumed_this_step = true;
    }

    /// Advance one simulation step.
    pub fn tick(&mut self, dt: f32) {
        if std::mem::take(&mut self.consumed_this_step) {
            return;
        }
        if self.current >= self.max {
            return;
        }

        self.time_since_use += dt;
        if self.time_since_use >= self.regen_delay {
            self.current = (self.current + self.regen_rate * dt).min(self.max);
        }
    }

    /// Overwrite the current value, clamped into range.
    pub fn set(&mut self, value: f32) {
        self.current = value.clamp(0.0, self.max);
    }
}
