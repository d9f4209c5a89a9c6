//! # Locomotion State Machine
//!
//! Decides the character's [`LocomotionState`] once per step from edge-detected
//! input, ground contact, stamina and stance clearance.
//!
//! ## Precedence
//!
//! Rules are tried in order and the first transition actually taken wins. A
//! rule whose guard fails (crouch-press under a low ceiling, say) is a no-op
//! and evaluation continues with the next rule.
//!
//! ```text
//!  1  Diving  -> Prone         timer elapsed (caller snaps geometry)
//!  2  Diving  -> Diving        timer running, nothing else evaluated
//!  3  Aiming  -> Aiming        aim held, nothing else evaluated
//!  5  Aiming  -> previous      aim released
//!  4  any     -> Aiming        aim pressed, remembers previous state
//!  6  Walk/Sprint -> Diving    dive pressed, grounded, moving, stamina >= cost
//!  7  crouch toggle            Crouch->Walk / Prone->Crouch need clearance
//!  8  Walk/Crouch -> Prone     prone pressed, grounded, clearance
//!  9  Prone -> Crouching       prone pressed, clearance
//! 10  -> Sprinting             sprint held, grounded, stamina > 0, moving
//! 11  Sprinting -> Walking     sprint released, exhausted or idle
//! 12  default                  anything else becomes Walking
//! ```
//!
//! `Climbing` is reserved: no rule enters it.

use frontlines_common::{LocomotionState, Stance, TickInput};

use crate::config::LocomotionConfig;
use crate::stamina::Stamina;
use crate::stance::ClearanceCheck;

/// Remaining dive time at or below which the dive is complete.
pub const DIVE_EPSILON: f32 = 1e-4;

/// Why a transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    DiveCompleted,
    AimPressed,
    AimReleased,
    DiveStarted,
    StoodUp,
    RoseToCrouch,
    CrouchedDown,
    WentProne,
    SprintStarted,
    SprintEnded,
    StaminaExhausted,
    Defaulted,
}

/// A transition taken this step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: LocomotionState,
    pub to: LocomotionState,
    pub reason: TransitionReason,
}

/// Everything a step's transition rules may read, plus the stamina they may spend.
pub struct TransitionContext<'a> {
    pub input: &'a TickInput,
    pub grounded: bool,
    pub stamina: &'a mut Stamina,
    pub clearance: &'a dyn ClearanceCheck,
    pub dt: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocomotionMachine {
    state: LocomotionState,
    previous_state: LocomotionState,
    dive_timer: f32,
    deadzone: f32,
    dive_cost: f32,
    dive_duration: f32,
}

impl LocomotionMachine {
    pub fn new(config: &LocomotionConfig) -> Self {
        Self {
            state: LocomotionState::Walking,
            previous_state: LocomotionState::Walking,
            dive_timer: 0.0,
            deadzone: config.movement.deadzone,
            dive_cost: config.stamina.dive_cost,
            dive_duration: config.dive.duration,
        }
    }

    pub fn state(&self) -> LocomotionState {
        self.state
    }

    pub fn previous_state(&self) -> LocomotionState {
        self.previous_state
    }

    pub fn dive_timer(&self) -> f32 {
        self.dive_timer
    }

    /// Move magnitude strictly above the deadzone.
    pub fn is_moving(&self, input: &TickInput) -> bool {
        input.move_axes.length() > self.deadzone
    }

    /// Apply the transition rules once.
    pub fn evaluate(&mut self, ctx: &mut TransitionContext<'_>) -> Option<StateChange> {
        use LocomotionState::*;

        // Rules 1 and 2.
        if self.state == Diving {
            self.dive_timer -= ctx.dt;
            if self.dive_timer <= DIVE_EPSILON {
                self.dive_timer = 0.0;
                return self.switch(Prone, TransitionReason::DiveCompleted);
            }
            return None;
        }

        let input = ctx.input;

        // Rules 3 and 5.
        if self.state == Aiming {
            // A restored Sprinting that is no longer allowed drops on the next tick.
            if input.aim_released || !input.aim_held {
                return self.switch(self.previous_state, TransitionReason::AimReleased);
            }
            return None;
        }

        // Rule 4.
        if input.aim_pressed {
            self.previous_state = self.state;
            return self.switch(Aiming, TransitionReason::AimPressed);
        }

        let moving = self.is_moving(input);

        // Rule 6.
        if input.dive_pressed
            && ctx.grounded
            && matches!(self.state, Walking | Sprinting)
            && moving
            && ctx.stamina.current() >= self.dive_cost
        {
            ctx.stamina.consume(self.dive_cost);
            self.dive_timer = self.dive_duration;
            return self.switch(Diving, TransitionReason::DiveStarted);
        }

        // Rule 7.
        if input.crouch_pressed {
            match self.state {
                Crouching => {
                    if ctx.clearance.can_assume(Stance::Standing) {
                        return self.switch(Walking, TransitionReason::StoodUp);
                    }
                }
                Prone => {
                    if ctx.clearance.can_assume(Stance::Crouching) {
                        return self.switch(Crouching, TransitionReason::RoseToCrouch);
                    }
                }
                Sprinting => {}
                _ if ctx.grounded => return self.switch(Crouching, TransitionReason::CrouchedDown),
                _ => {}
            }
        }

        // Rules 8 and 9.
        if input.prone_pressed {
            match self.state {
                Prone => {
                    if ctx.clearance.can_assume(Stance::Crouching) {
                        return self.switch(Crouching, TransitionReason::RoseToCrouch);
                    }
                }
                Walking | Crouching if ctx.grounded => {
                    if ctx.clearance.can_assume(Stance::Prone) {
                        return self.switch(Prone, TransitionReason::WentProne);
                    }
                }
                _ => {}
            }
        }

        // Rule 10.
        if !matches!(self.state, Crouching | Prone) && self.sprint_allowed(ctx) {
            return self.switch(Sprinting, TransitionReason::SprintStarted);
        }

        // Rule 11.
        if self.state == Sprinting
            && (!input.sprint_held || ctx.stamina.is_depleted() || !moving)
        {
            return self.switch(Walking, TransitionReason::SprintEnded);
        }

        // Rule 12.
        if !matches!(self.state, Crouching | Prone | Sprinting) {
            return self.switch(Walking, TransitionReason::Defaulted);
        }

        None
    }

    /// Leave Sprinting as soon as stamina runs out, within the same step.
    pub fn enforce_stamina(&mut self, stamina: &Stamina) -> Option<StateChange> {
        if self.state == LocomotionState::Sprinting && stamina.is_depleted() {
            return self.switch(LocomotionState::Walking, TransitionReason::StaminaExhausted);
        }
        None
    }

    /// Drop out of Aiming without input, e.g. when the simulation is suspended.
    pub fn cancel_aim(&mut self) -> Option<StateChange> {
        if self.state != LocomotionState::Aiming {
            return None;
        }
        self.switch(self.previous_state, TransitionReason::AimReleased)
    }

    fn sprint_allowed(&self, ctx: &TransitionContext<'_>) -> bool {
        ctx.input.sprint_held
            && ctx.grounded
            && !ctx.stamina.is_depleted()
            && self.is_moving(ctx.input)
    }

    /// Returns `None` when `to` is the current state.
    fn switch(&mut self, to: LocomotionState, reason: TransitionReason) -> Option<StateChange> {
        if self.state == to {
            return None;
        }
        let from = self.state;
        self.state = to;
        Some(StateChange { from, to, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaminaConfig;
    use bevy::prelude::*;

    const DT: f32 = 1.0 / 60.0;

    struct Clearance(bool);

    impl ClearanceCheck for Clearance {
        fn can_assume(&self, _stance: Stance) -> bool {
            self.0
        }
    }

    struct Rig {
        machine: LocomotionMachine,
        stamina: Stamina,
        grounded: bool,
        clear: bool,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                machine: LocomotionMachine::new(&LocomotionConfig::default()),
                stamina: Stamina::new(&StaminaConfig::default()),
                grounded: true,
                clear: true,
            }
        }

        fn in_state(state: LocomotionState) -> Self {
            let mut rig = Self::new();
            rig.machine.state = state;
            rig
        }

        fn step(&mut self, input: TickInput) -> Option<StateChange> {
            let clearance = Clearance(self.clear);
            let mut ctx = TransitionContext {
                input: &input,
                grounded: self.grounded,
                stamina: &mut self.stamina,
                clearance: &clearance,
                dt: DT,
            };
            self.machine.evaluate(&mut ctx)
        }

        fn state(&self) -> LocomotionState {
            self.machine.state()
        }
    }

    fn forward(magnitude: f32) -> TickInput {
        TickInput::moving(Vec2::new(0.0, magnitude))
    }

    #[test]
    fn test_no_sprint_without_stamina() {
        let mut rig = Rig::new();
        rig.stamina.set(0.0);
        rig.step(forward(1.0).with_sprint());
        assert_eq!(rig.state(), LocomotionState::Walking);
    }

    #[test]
    fn test_sprint_starts_when_moving() {
        let mut rig = Rig::new();
        let change = rig.step(forward(1.0).with_sprint());
        assert_eq!(change.map(|c| c.reason), Some(TransitionReason::SprintStarted));
        assert_eq!(rig.state(), LocomotionState::Sprinting);
    }

    #[test]
    fn test_sprint_requires_effort_above_deadzone() {
        let mut rig = Rig::new();
        rig.step(forward(0.1).with_sprint());
        assert_eq!(rig.state(), LocomotionState::Walking);
    }

    #[test]
    fn test_sprint_ends_when_released_or_idle() {
        let mut rig = Rig::new();
        rig.step(forward(1.0).with_sprint());
        rig.step(forward(1.0));
        assert_eq!(rig.state(), LocomotionState::Walking);

        rig.step(forward(1.0).with_sprint());
        rig.step(forward(0.05).with_sprint());
        assert_eq!(rig.state(), LocomotionState::Walking);
    }

    #[test]
    fn test_sprint_never_starts_from_crouch_or_prone() {
        for state in [LocomotionState::Crouching, LocomotionState::Prone] {
            let mut rig = Rig::in_state(state);
            rig.step(forward(1.0).with_sprint());
            assert_eq!(rig.state(), state);
        }
    }

    #[test]
    fn test_enforce_stamina_drops_sprint() {
        let mut rig = Rig::new();
        rig.step(forward(1.0).with_sprint());
        rig.stamina.set(0.0);
        let change = rig.machine.enforce_stamina(&rig.stamina);
        assert_eq!(change.map(|c| c.reason), Some(TransitionReason::StaminaExhausted));
        assert_eq!(rig.state(), LocomotionState::Walking);
    }

    #[test]
    fn test_prone_crouch_press_rises_when_clear() {
        let mut rig = Rig::in_state(LocomotionState::Prone);
        let mut input = TickInput::default();
        input.crouch_pressed = true;
        rig.step(input);
        assert_eq!(rig.state(), LocomotionState::Crouching);
    }

    #[test]
    fn test_prone_crouch_press_blocked_stays_prone() {
        let mut rig = Rig::in_state(LocomotionState::Prone);
        rig.clear = false;
        let mut input = TickInput::default();
        input.crouch_pressed = true;
        assert_eq!(rig.step(input), None);
        assert_eq!(rig.state(), LocomotionState::Prone);
    }

    #[test]
    fn test_crouch_toggle() {
        let mut rig = Rig::new();
        let mut input = TickInput::default();
        input.crouch_pressed = true;

        rig.step(input);
        assert_eq!(rig.state(), LocomotionState::Crouching);

        rig.clear = false;
        rig.step(input);
        assert_eq!(rig.state(), LocomotionState::Crouching);

        rig.clear = true;
        rig.step(input);
        assert_eq!(rig.state(), LocomotionState::Walking);
    }

    #[test]
    fn test_crouch_needs_ground_but_no_clearance() {
        let mut rig = Rig::new();
        rig.clear = false;
        rig.grounded = false;
        let mut input = TickInput::default();
        input.crouch_pressed = true;
        rig.step(input);
        assert_eq!(rig.state(), LocomotionState::Walking);

        rig.grounded = true;
        rig.step(input);
        assert_eq!(rig.state(), LocomotionState::Crouching);
    }

    #[test]
    fn test_crouch_press_ignored_while_sprinting() {
        let mut rig = Rig::new();
        rig.step(forward(1.0).with_sprint());
        let mut input = forward(1.0).with_sprint();
        input.crouch_pressed = true;
        rig.step(input);
        assert_eq!(rig.state(), LocomotionState::Sprinting);
    }

    #[test]
    fn test_prone_toggle_is_gated() {
        let mut rig = Rig::new();
        let mut input = TickInput::default();
        input.prone_pressed = true;

        rig.clear = false;
        rig.step(input);
        assert_eq!(rig.state(), LocomotionState::Walking);

        rig.clear = true;
        rig.step(input);
        assert_eq!(rig.state(), LocomotionState::Prone);

        rig.step(input);
        assert_eq!(rig.state(), LocomotionState::Crouching);
    }

    #[test]
    fn test_dive_initiation() {
        let mut rig = Rig::new();
        rig.stamina.set(50.0);
        let mut input = forward(0.5);
        input.dive_pressed = true;

        let change = rig.step(input);
        assert_eq!(change.map(|c| c.to), Some(LocomotionState::Diving));
        assert_eq!(rig.stamina.current(), 30.0);
        assert_eq!(rig.machine.dive_timer(), 0.5);
    }

    #[test]
    fn test_dive_requires_stamina_movement_and_ground() {
        let mut input = forward(0.5);
        input.dive_pressed = true;

        let mut tired = Rig::new();
        tired.stamina.set(19.0);
        tired.step(input);
        assert_eq!(tired.state(), LocomotionState::Walking);

        let mut idle = Rig::new();
        let mut still = TickInput::default();
        still.dive_pressed = true;
        idle.step(still);
        assert_eq!(idle.state(), LocomotionState::Walking);

        let mut airborne = Rig::new();
        airborne.grounded = false;
        airborne.step(input);
        assert_eq!(airborne.state(), LocomotionState::Walking);

        let mut crouched = Rig::in_state(LocomotionState::Crouching);
        crouched.step(input);
        assert_eq!(crouched.state(), LocomotionState::Crouching);
    }

    #[test]
    fn test_dive_always_ends_prone() {
        let mut rig = Rig::new();
        let mut input = forward(1.0);
        input.dive_pressed = true;
        rig.step(input);

        let mut elapsed = 0.0;
        let mut completed = None;
        while rig.state() == LocomotionState::Diving {
            // Hostile input while diving changes nothing.
            let mut noisy = forward(1.0).with_sprint();
            noisy.aim_pressed = true;
            noisy.aim_held = true;
            noisy.crouch_pressed = true;
            completed = rig.step(noisy);
            elapsed += DT;
            assert!(elapsed <= 0.5 + 1e-4);
        }
        assert_eq!(rig.state(), LocomotionState::Prone);
        assert_eq!(completed.map(|c| c.reason), Some(TransitionReason::DiveCompleted));
    }

    #[test]
    fn test_aim_restores_previous_state() {
        for state in [
            LocomotionState::Walking,
            LocomotionState::Crouching,
            LocomotionState::Prone,
            LocomotionState::Climbing,
        ] {
            let mut rig = Rig::in_state(state);
            let mut press = TickInput::default();
            press.aim_pressed = true;
            press.aim_held = true;
            rig.step(press);
            assert_eq!(rig.state(), LocomotionState::Aiming);

            let mut hold = TickInput::default();
            hold.aim_held = true;
            hold.crouch_pressed = true;
            hold.prone_pressed = true;
            rig.step(hold);
            assert_eq!(rig.state(), LocomotionState::Aiming);

            let mut release = TickInput::default();
            release.aim_released = true;
            rig.step(release);
            assert_eq!(rig.state(), state);
        }
    }

    #[test]
    fn test_aim_restores_sprint_while_still_sprinting() {
        let mut rig = Rig::new();
        rig.step(forward(1.0).with_sprint());

        let mut press = forward(1.0).with_sprint();
        press.aim_pressed = true;
        press.aim_held = true;
        rig.step(press);
        assert_eq!(rig.machine.previous_state(), LocomotionState::Sprinting);

        let mut release = forward(1.0).with_sprint();
        release.aim_released = true;
        rig.step(release);
        assert_eq!(rig.state(), LocomotionState::Sprinting);
    }

    #[test]
    fn test_aim_release_restores_sprint_then_drops_it() {
        let mut rig = Rig::new();
        rig.step(forward(1.0).with_sprint());
        let mut press = forward(1.0).with_sprint();
        press.aim_pressed = true;
        press.aim_held = true;
        rig.step(press);

        // Sprint let go while aiming.
        let mut release = TickInput::default();
        release.aim_released = true;
        let change = rig.step(release);
        assert_eq!(change.map(|c| c.reason), Some(TransitionReason::AimReleased));
        assert_eq!(rig.state(), LocomotionState::Sprinting);

        let change = rig.step(TickInput::default());
        assert_eq!(change.map(|c| c.reason), Some(TransitionReason::SprintEnded));
        assert_eq!(rig.state(), LocomotionState::Walking);
    }

    #[test]
    fn test_cancel_aim_restores_previous_exactly() {
        let mut rig = Rig::new();
        rig.step(forward(1.0).with_sprint());
        let mut press = forward(1.0).with_sprint();
        press.aim_pressed = true;
        press.aim_held = true;
        rig.step(press);

        assert!(rig.machine.cancel_aim().is_some());
        assert_eq!(rig.state(), LocomotionState::Sprinting);
        assert_eq!(rig.machine.cancel_aim(), None);
    }

    #[test]
    fn test_repress_while_aiming_keeps_previous() {
        let mut rig = Rig::in_state(LocomotionState::Crouching);
        let mut press = TickInput::default();
        press.aim_pressed = true;
        press.aim_held = true;
        rig.step(press);
        rig.step(press);
        assert_eq!(rig.machine.previous_state(), LocomotionState::Crouching);
    }

    #[test]
    fn test_sprint_never_entered_at_or_below_deadzone() {
        // Deterministic pseudo-random input sequence.
        let mut seed: u32 = 0x2545_F491;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };

        let mut rig = Rig::new();
        for _ in 0..5000 {
            let bits = next();
            let magnitude = (bits % 200) as f32 / 1000.0;
            let mut input = TickInput::moving(Vec2::new(0.0, magnitude));
            input.sprint_held = bits & 0x100 != 0;
            input.crouch_pressed = bits & 0x1e00 == 0x200;
            input.prone_pressed = bits & 0x1e000 == 0x2000;
            input.dive_pressed = bits & 0x20000 != 0;
            input.aim_held = bits & 0xc0000 == 0x40000;
            input.aim_pressed = input.aim_held && rig.state() != LocomotionState::Aiming;
            input.aim_released = !input.aim_held && rig.state() == LocomotionState::Aiming;
            rig.grounded = bits & 0x100000 != 0 || bits & 0x200000 != 0;
            if bits & 0x400000 != 0 {
                rig.stamina.set(rig.stamina.max());
            }

            let before = rig.state();
            rig.step(input);
            if rig.state() == LocomotionState::Sprinting && before != LocomotionState::Sprinting {
                assert!(magnitude > 0.1, "sprint entered at magnitude {magnitude}");
            }
            rig.stamina.tick(DT);
        }
    }
}
