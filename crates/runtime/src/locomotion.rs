//! # Locomotion
//!
//! Per-character aggregate that owns every locomotion component and steps
//! them in order.
//!
//! ## Lifecycle
//!
//! ```text
//!   new() ──initialize()──► Ready ──on_activate()──► Active ◄─┐
//!     │                                                │       │
//!     └── missing collaborator ──► Faulted   on_deactivate()  on_activate()
//!                                                      ▼       │
//!                                                   Inactive ──┘
//! ```
//!
//! The driver loop owns the schedule: it calls [`Locomotion::step`] once per
//! fixed tick with the world and that tick's input. Nothing here is invoked
//! implicitly.
//!
//! ## Step order
//!
//! ground probe → transitions → stamina → jump → stance blend →
//! horizontal move → vertical move → orientation → readout

use bevy::prelude::*;
use frontlines_common::{CharacterMover, LocomotionState, TickInput};

use crate::config::LocomotionConfig;
use crate::error::{LocomotionError, LocomotionResult};
use crate::ground::GroundDetector;
use crate::motion::{speed_multiplier, MotionIntegrator};
use crate::orientation::OrientationController;
use crate::stamina::Stamina;
use crate::stance::{StanceController, StanceProbe};
use crate::state_machine::{
    LocomotionMachine, StateChange, TransitionContext, TransitionReason,
};

// ============================================================================
// Lifecycle
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect)]
pub enum Lifecycle {
    #[default]
    Created,
    Ready,
    Active,
    Inactive,
    /// A configuration fault was found; the entity is never simulated.
    Faulted,
}

// ============================================================================
// Readout
// ============================================================================

/// Read-only values for the presentation layer (animation blending, HUD).
#[derive(Component, Debug, Clone, Copy, PartialEq, Default, Reflect)]
#[reflect(Component)]
pub struct LocomotionReadout {
    pub state: LocomotionState,
    pub horizontal_input: f32,
    pub vertical_input: f32,
    /// Move magnitude scaled by the state's speed multiplier
    pub normalized_speed: f32,
    pub is_sprinting: bool,
    pub is_crouching: bool,
    pub is_prone: bool,
    pub is_diving: bool,
    pub is_aiming: bool,
    pub grounded: bool,
    pub vertical_velocity: f32,
    pub stamina_fraction: f32,
}

impl LocomotionReadout {
    /// Readout for a mirrored state, as seen by an observer that only knows the enum.
    pub fn mirrored(state: LocomotionState) -> Self {
        Self {
            state,
            is_sprinting: state == LocomotionState::Sprinting,
            is_crouching: state == LocomotionState::Crouching,
            is_prone: state == LocomotionState::Prone,
            is_diving: state == LocomotionState::Diving,
            is_aiming: state == LocomotionState::Aiming,
            grounded: true,
            ..default()
        }
    }
}

/// What happened during one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    pub transitions: Vec<StateChange>,
    pub jumped: bool,
}

// ============================================================================
// Locomotion
// ============================================================================

#[derive(Debug, Clone)]
pub struct Locomotion {
    config: LocomotionConfig,
    lifecycle: Lifecycle,
    position: Vec3,
    grounded: bool,
    machine: LocomotionMachine,
    stamina: Stamina,
    stance: StanceController,
    ground: GroundDetector,
    motion: MotionIntegrator,
    orientation: OrientationController,
    readout: LocomotionReadout,
}

impl Locomotion {
    pub fn new(config: LocomotionConfig, position: Vec3, yaw: f32) -> Self {
        Self {
            lifecycle: Lifecycle::Created,
            position,
            grounded: false,
            machine: LocomotionMachine::new(&config),
            stamina: Stamina::new(&config.stamina),
            stance: StanceController::new(&config.stance),
            ground: GroundDetector::new(&config.ground),
            motion: MotionIntegrator::new(&config.movement, &config.dive, &config.jump),
            orientation: OrientationController::new(&config.look, yaw),
            readout: LocomotionReadout::default(),
            config,
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Validate configuration and collaborators. A failure faults the entity permanently.
    pub fn initialize(&mut self, world: Option<&dyn CharacterMover>) -> LocomotionResult<()> {
        match self.lifecycle {
            Lifecycle::Faulted => {
                return Err(LocomotionError::Faulted(
                    "initialize called on a faulted entity".to_string(),
                ))
            }
            Lifecycle::Created => {}
            // Already initialized.
            _ => return Ok(()),
        }

        let result = self.check_collaborators(world);
        match (result, world) {
            (Ok(()), Some(world)) => {
                self.grounded = self
                    .ground
                    .is_grounded(world, &self.stance.capsule(), self.position);
                self.refresh_readout(&TickInput::default());
                self.lifecycle = Lifecycle::Ready;
                Ok(())
            }
            (Err(err), _) => {
                self.lifecycle = Lifecycle::Faulted;
                Err(err)
            }
            (Ok(()), None) => {
                self.lifecycle = Lifecycle::Faulted;
                Err(LocomotionError::MissingCollaborator("world query"))
            }
        }
    }

    fn check_collaborators(&self, world: Option<&dyn CharacterMover>) -> LocomotionResult<()> {
        if world.is_none() {
            return Err(LocomotionError::MissingCollaborator("world query"));
        }
        if self.config.ground.mask.is_empty() {
            return Err(LocomotionError::MissingCollaborator("ground layer mask"));
        }
        self.config.validate()
    }

    /// Start simulating. Returns false if the entity is not initialized or is faulted.
    pub fn on_activate(&mut self) -> bool {
        match self.lifecycle {
            Lifecycle::Ready | Lifecycle::Inactive => {
                self.lifecycle = Lifecycle::Active;
                true
            }
            Lifecycle::Active => true,
            Lifecycle::Created | Lifecycle::Faulted => false,
        }
    }

    /// Stop simulating. An active aim is cancelled so the state stays valid.
    pub fn on_deactivate(&mut self) -> Option<StateChange> {
        if self.lifecycle != Lifecycle::Active {
            return None;
        }
        self.lifecycle = Lifecycle::Inactive;
        let change = self.machine.cancel_aim();
        if change.is_some() {
            self.refresh_readout(&TickInput::default());
        }
        change
    }

    // ------------------------------------------------------------------------
    // Step
    // ------------------------------------------------------------------------

    /// Advance one fixed tick.
    ///
    /// Ready and Inactive entities are left untouched.
    pub fn step(
        &mut self,
        world: &dyn CharacterMover,
        input: &TickInput,
        dt: f32,
    ) -> LocomotionResult<StepReport> {
        match self.lifecycle {
            Lifecycle::Active => {}
            Lifecycle::Ready | Lifecycle::Inactive => return Ok(StepReport::default()),
            Lifecycle::Created => return Err(LocomotionError::NotInitialized),
            Lifecycle::Faulted => {
                return Err(LocomotionError::Faulted(
                    "step called on a faulted entity".to_string(),
                ))
            }
        }

        let mut report = StepReport::default();

        self.grounded = self
            .ground
            .is_grounded(world, &self.stance.capsule(), self.position);

        // Transitions
        let probe = StanceProbe {
            stance: &self.stance,
            world,
            position: self.position,
        };
        let mut ctx = TransitionContext {
            input,
            grounded: self.grounded,
            stamina: &mut self.stamina,
            clearance: &probe,
            dt,
        };
        if let Some(change) = self.machine.evaluate(&mut ctx) {
            report.transitions.push(change);
        }
        if report
            .transitions
            .iter()
            .any(|c| c.reason == TransitionReason::DiveCompleted)
        {
            self.stance.snap_to(LocomotionState::Prone.stance());
        }

        // Stamina
        if self.machine.state() == LocomotionState::Sprinting && self.machine.is_moving(input) {
            self.stamina.consume(self.config.stamina.sprint_cost * dt);
        }
        self.stamina.tick(dt);
        if let Some(change) = self.machine.enforce_stamina(&self.stamina) {
            report.transitions.push(change);
        }

        let state = self.machine.state();

        if input.jump_pressed {
            report.jumped = self.motion.try_jump(state, self.grounded);
        }

        self.stance.blend(state, dt);

        // Motion
        let capsule = self.stance.capsule();
        let mask = self.config.movement.collision_mask;
        let horizontal =
            self.motion
                .horizontal_displacement(state, input, self.orientation.body_rotation(), dt);
        if horizontal != Vec3::ZERO {
            self.position = world.move_capsule(&capsule, self.position, horizontal, mask);
        }
        let vertical = self.motion.vertical_displacement(self.grounded, dt);
        self.position = world.move_capsule(&capsule, self.position, vertical, mask);

        self.orientation
            .apply_look(input.look_axes, state == LocomotionState::Aiming, dt);

        self.refresh_readout(input);

        for change in &report.transitions {
            debug!(
                "Locomotion {} -> {} ({:?})",
                change.from, change.to, change.reason
            );
        }

        Ok(report)
    }

    fn refresh_readout(&mut self, input: &TickInput) {
        let state = self.machine.state();
        let magnitude = input.move_axes.length().min(1.0);
        let multiplier = speed_multiplier(state, &self.config.movement).unwrap_or(1.0);

        self.readout = LocomotionReadout {
            state,
            horizontal_input: input.move_axes.x,
            vertical_input: input.move_axes.y,
            normalized_speed: magnitude * multiplier,
            is_sprinting: state == LocomotionState::Sprinting,
            is_crouching: state == LocomotionState::Crouching,
            is_prone: state == LocomotionState::Prone,
            is_diving: state == LocomotionState::Diving,
            is_aiming: state == LocomotionState::Aiming,
            grounded: self.grounded,
            vertical_velocity: self.motion.vertical_velocity(),
            stamina_fraction: self.stamina.fraction(),
        };
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &LocomotionConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn state(&self) -> LocomotionState {
        self.machine.state()
    }

    pub fn previous_state(&self) -> LocomotionState {
        self.machine.previous_state()
    }

    pub fn stamina(&self) -> f32 {
        self.stamina.current()
    }

    pub fn vertical_velocity(&self) -> f32 {
        self.motion.vertical_velocity()
    }

    pub fn current_height(&self) -> f32 {
        self.stance.current_height()
    }

    pub fn current_center(&self) -> f32 {
        self.stance.current_center()
    }

    /// Height the capsule is currently blending toward.
    pub fn target_height(&self) -> f32 {
        self.stance.target(self.machine.state().stance()).height
    }

    pub fn dive_timer(&self) -> f32 {
        self.machine.dive_timer()
    }

    pub fn is_grounded(&self) -> bool {
        self.grounded
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn yaw(&self) -> f32 {
        self.orientation.yaw()
    }

    pub fn pitch(&self) -> f32 {
        self.orientation.pitch()
    }

    pub fn camera_yaw(&self) -> f32 {
        self.orientation.camera_yaw()
    }

    pub fn body_rotation(&self) -> Quat {
        self.orientation.body_rotation()
    }

    pub fn readout(&self) -> LocomotionReadout {
        self.readout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frontlines_common::{LayerMask, StaticWorld};

    const DT: f32 = 1.0 / 60.0;

    fn spawn(world: &StaticWorld) -> Locomotion {
        let mut locomotion = Locomotion::new(LocomotionConfig::default(), Vec3::ZERO, 0.0);
        locomotion.initialize(Some(world)).expect("initialize");
        assert!(locomotion.on_activate());
        locomotion
    }

    fn run(locomotion: &mut Locomotion, world: &StaticWorld, input: TickInput, ticks: usize) {
        for _ in 0..ticks {
            locomotion.step(world, &input, DT).expect("step");
        }
    }

    fn forward(magnitude: f32) -> TickInput {
        TickInput::moving(Vec2::new(0.0, magnitude))
    }

    #[test]
    fn test_missing_world_faults() {
        let mut locomotion = Locomotion::new(LocomotionConfig::default(), Vec3::ZERO, 0.0);
        let err = locomotion.initialize(None).unwrap_err();
        assert_eq!(err, LocomotionError::MissingCollaborator("world query"));
        assert_eq!(locomotion.lifecycle(), Lifecycle::Faulted);
        assert!(!locomotion.on_activate());

        let world = StaticWorld::with_ground(0.0);
        assert!(locomotion.step(&world, &TickInput::default(), DT).is_err());
    }

    #[test]
    fn test_empty_ground_mask_faults() {
        let mut config = LocomotionConfig::default();
        config.ground.mask = LayerMask::NONE;
        let world = StaticWorld::with_ground(0.0);
        let mut locomotion = Locomotion::new(config, Vec3::ZERO, 0.0);
        let err = locomotion.initialize(Some(&world)).unwrap_err();
        assert_eq!(err, LocomotionError::MissingCollaborator("ground layer mask"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_step_before_initialize() {
        let world = StaticWorld::with_ground(0.0);
        let mut locomotion = Locomotion::new(LocomotionConfig::default(), Vec3::ZERO, 0.0);
        assert_eq!(
            locomotion.step(&world, &TickInput::default(), DT),
            Err(LocomotionError::NotInitialized)
        );
    }

    #[test]
    fn test_inactive_entity_does_not_move() {
        let world = StaticWorld::with_ground(0.0);
        let mut locomotion = spawn(&world);
        locomotion.on_deactivate();
        run(&mut locomotion, &world, forward(1.0), 30);
        assert_eq!(locomotion.position(), Vec3::ZERO);
    }

    #[test]
    fn test_rests_on_ground() {
        let world = StaticWorld::with_ground(0.0);
        let mut locomotion = spawn(&world);
        run(&mut locomotion, &world, TickInput::default(), 60);
        assert!(locomotion.is_grounded());
        assert!(locomotion.position().y.abs() < 0.01);
        assert_eq!(locomotion.vertical_velocity(), -2.0);
    }

    #[test]
    fn test_falls_and_lands() {
        let world = StaticWorld::with_ground(0.0);
        let mut locomotion = Locomotion::new(LocomotionConfig::default(), Vec3::Y * 3.0, 0.0);
        locomotion.initialize(Some(&world)).expect("initialize");
        locomotion.on_activate();
        assert!(!locomotion.is_grounded());

        run(&mut locomotion, &world, TickInput::default(), 120);
        assert!(locomotion.is_grounded());
        assert!(locomotion.position().y.abs() < 0.01);
    }

    #[test]
    fn test_walks_forward_at_walk_speed() {
        let world = StaticWorld::with_ground(0.0);
        let mut locomotion = spawn(&world);
        run(&mut locomotion, &world, forward(1.0), 60);
        let travelled = locomotion.position();
        assert!((travelled.z + 5.0).abs() < 0.05, "travelled {travelled:?}");
        assert!(travelled.x.abs() < 1e-4);
    }

    #[test]
    fn test_sprint_drains_stamina() {
        let world = StaticWorld::with_ground(0.0);
        let mut locomotion = spawn(&world);
        run(&mut locomotion, &world, forward(1.0).with_sprint(), 60);
        assert_eq!(locomotion.state(), LocomotionState::Sprinting);
        assert!((locomotion.stamina() - 90.0).abs() < 0.2);
    }

    #[test]
    fn test_exhaustion_ends_sprint_same_step() {
        let world = StaticWorld::with_ground(0.0);
        let mut locomotion = spawn(&world);
        run(&mut locomotion, &world, forward(1.0).with_sprint(), 1);
        assert_eq!(locomotion.state(), LocomotionState::Sprinting);

        locomotion.stamina.set(0.05);
        let report = locomotion
            .step(&world, &forward(1.0).with_sprint(), DT)
            .expect("step");
        assert_eq!(locomotion.stamina(), 0.0);
        assert_eq!(locomotion.state(), LocomotionState::Walking);
        assert!(report
            .transitions
            .iter()
            .any(|c| c.reason == TransitionReason::StaminaExhausted));
    }

    #[test]
    fn test_no_sprint_at_zero_stamina() {
        let world = StaticWorld::with_ground(0.0);
        let mut locomotion = spawn(&world);
        locomotion.stamina.set(0.0);
        run(&mut locomotion, &world, forward(1.0).with_sprint(), 1);
        assert_eq!(locomotion.state(), LocomotionState::Walking);
    }

    #[test]
    fn test_prone_crouch_press_targets_crouch_height() {
        let world = StaticWorld::with_ground(0.0);
        let mut locomotion = spawn(&world);
        let mut prone = TickInput::default();
        prone.prone_pressed = true;
        run(&mut locomotion, &world, prone, 1);
        assert_eq!(locomotion.state(), LocomotionState::Prone);

        let mut crouch = TickInput::default();
        crouch.crouch_pressed = true;
        run(&mut locomotion, &world, crouch, 1);
        assert_eq!(locomotion.state(), LocomotionState::Crouching);
        assert_eq!(locomotion.target_height(), 0.9);
    }

    #[test]
    fn test_dive_scenario() {
        let world = StaticWorld::with_ground(0.0);
        let mut locomotion = spawn(&world);
        locomotion.stamina.set(50.0);
        let mut input = forward(0.5);
        input.dive_pressed = true;
        run(&mut locomotion, &world, input, 1);

        assert_eq!(locomotion.state(), LocomotionState::Diving);
        assert_eq!(locomotion.stamina(), 30.0);
        assert_eq!(locomotion.dive_timer(), 0.5);
    }

    #[test]
    fn test_dive_ends_prone_with_snapped_geometry() {
        let world = StaticWorld::with_ground(0.0);
        let mut locomotion = spawn(&world);
        let mut input = forward(1.0);
        input.dive_pressed = true;
        run(&mut locomotion, &world, input, 1);
        let start = locomotion.position();

        let mut ticks = 0;
        while locomotion.state() == LocomotionState::Diving {
            run(&mut locomotion, &world, TickInput::default(), 1);
            ticks += 1;
            assert!(ticks <= 30);
        }
        assert_eq!(locomotion.state(), LocomotionState::Prone);
        assert_eq!(locomotion.current_height(), 0.4);
        // Dive carried the character forward without input.
        assert!(locomotion.position().z < start.z - 3.0);
    }

    #[test]
    fn test_cannot_stand_under_low_ceiling() {
        let mut world = StaticWorld::with_ground(0.0);
        world.add_box(Vec3::new(-3.0, 1.2, -3.0), Vec3::new(3.0, 2.0, 3.0), LayerMask::DEFAULT);
        let mut locomotion = spawn(&world);
        locomotion.stance.snap_to(frontlines_common::Stance::Crouching);

        let mut crouch = TickInput::default();
        crouch.crouch_pressed = true;
        run(&mut locomotion, &world, crouch, 1);
        assert_eq!(locomotion.state(), LocomotionState::Crouching);

        // Already crouched: pressing again tries to stand and is refused.
        run(&mut locomotion, &world, crouch, 1);
        assert_eq!(locomotion.state(), LocomotionState::Crouching);
    }

    #[test]
    fn test_jump_leaves_ground_and_returns() {
        let world = StaticWorld::with_ground(0.0);
        let mut locomotion = spawn(&world);
        run(&mut locomotion, &world, TickInput::default(), 2);

        let mut jump = TickInput::default();
        jump.jump_pressed = true;
        let report = locomotion.step(&world, &jump, DT).expect("step");
        assert!(report.jumped);
        run(&mut locomotion, &world, TickInput::default(), 10);
        assert!(locomotion.position().y > 1.0);

        run(&mut locomotion, &world, TickInput::default(), 600);
        assert!(locomotion.is_grounded());
    }

    #[test]
    fn test_deactivate_while_aiming_restores_state() {
        let world = StaticWorld::with_ground(0.0);
        let mut locomotion = spawn(&world);
        let mut crouch = TickInput::default();
        crouch.crouch_pressed = true;
        run(&mut locomotion, &world, crouch, 1);

        let mut aim = TickInput::default();
        aim.aim_pressed = true;
        aim.aim_held = true;
        run(&mut locomotion, &world, aim, 1);
        assert_eq!(locomotion.state(), LocomotionState::Aiming);

        locomotion.on_deactivate();
        assert_eq!(locomotion.state(), LocomotionState::Crouching);
        assert_eq!(locomotion.lifecycle(), Lifecycle::Inactive);
    }

    #[test]
    fn test_readout_tracks_state() {
        let world = StaticWorld::with_ground(0.0);
        let mut locomotion = spawn(&world);
        run(&mut locomotion, &world, forward(1.0).with_sprint(), 1);
        let readout = locomotion.readout();
        assert!(readout.is_sprinting && !readout.is_crouching);
        assert!(readout.grounded);
        assert!((readout.normalized_speed - 1.6).abs() < 1e-5);
        assert_eq!(readout.vertical_input, 1.0);
    }
}
