//! # Character Driver
//!
//! Bevy-side driver for [`Locomotion`]. Owns the fixed-tick schedule and the
//! explicit lifecycle calls; the aggregate itself never looks at the ECS.
//!
//! ## Per tick
//!
//! 1. Newly spawned characters are initialized against [`PhysicsWorld`] and
//!    activated. A configuration fault marks the entity [`SimulationFault`].
//! 2. Queued [`LifecycleRequest`]s activate or deactivate characters.
//! 3. Every healthy character consumes its [`CharacterInput`], steps, and
//!    writes its `Transform` and [`LocomotionReadout`].

use bevy::prelude::*;
use frontlines_common::CharacterInput;

use crate::config::LocomotionConfig;
use crate::error::LocomotionError;
use crate::locomotion::{Locomotion, LocomotionReadout};
use crate::physics::PhysicsWorld;

// ============================================================================
// Components
// ============================================================================

/// An authoritatively simulated character.
#[derive(Component, Debug, Clone)]
pub struct CharacterController {
    pub locomotion: Locomotion,
}

impl CharacterController {
    pub fn new(config: LocomotionConfig, position: Vec3, yaw: f32) -> Self {
        Self {
            locomotion: Locomotion::new(config, position, yaw),
        }
    }
}

/// Marks a character whose configuration fault stopped its simulation.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default, Reflect)]
#[reflect(Component)]
pub struct SimulationFault;

/// Explicit activation control for a character.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleRequest {
    Activate(Entity),
    Deactivate(Entity),
}

/// Ordering of locomotion work inside `FixedUpdate`.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocomotionSet {
    Simulate,
}

// ============================================================================
// Plugin
// ============================================================================

/// Steps every [`CharacterController`] once per fixed tick.
pub struct LocomotionPlugin;

impl Plugin for LocomotionPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<LocomotionReadout>()
            .register_type::<SimulationFault>()
            .init_resource::<LocomotionConfig>()
            .add_message::<LifecycleRequest>()
            .add_systems(
                FixedUpdate,
                (
                    initialize_characters,
                    apply_lifecycle_requests,
                    step_characters,
                )
                    .chain()
                    .in_set(LocomotionSet::Simulate),
            );
    }
}

// ============================================================================
// Systems
// ============================================================================

/// Initialize and activate characters spawned since the last tick.
pub fn initialize_characters(
    mut commands: Commands,
    physics: Option<Res<PhysicsWorld>>,
    mut query: Query<(Entity, &mut CharacterController), Added<CharacterController>>,
) {
    for (entity, mut controller) in query.iter_mut() {
        let world = physics.as_deref().map(PhysicsWorld::mover);
        match controller.locomotion.initialize(world) {
            Ok(()) => {
                controller.locomotion.on_activate();
                debug!("Character {:?} ready", entity);
            }
            Err(e) => {
                error!("Character {:?} will not be simulated: {}", entity, e);
                commands.entity(entity).insert(SimulationFault);
            }
        }
    }
}

fn apply_lifecycle_requests(
    mut requests: MessageReader<LifecycleRequest>,
    mut query: Query<&mut CharacterController>,
) {
    for request in requests.read() {
        match *request {
            LifecycleRequest::Activate(entity) => {
                if let Ok(mut controller) = query.get_mut(entity) {
                    if !controller.locomotion.on_activate() {
                        warn!("Character {:?} cannot be activated", entity);
                    }
                }
            }
            LifecycleRequest::Deactivate(entity) => {
                if let Ok(mut controller) = query.get_mut(entity) {
                    if let Some(change) = controller.locomotion.on_deactivate() {
                        debug!(
                            "Character {:?} deactivated, {} -> {}",
                            entity, change.from, change.to
                        );
                    }
                }
            }
        }
    }
}

/// Step every healthy character with this tick's input.
pub fn step_characters(
    mut commands: Commands,
    physics: Option<Res<PhysicsWorld>>,
    time: Res<Time>,
    mut query: Query<
        (
            Entity,
            &mut CharacterController,
            Option<&mut CharacterInput>,
            &mut Transform,
            Option<&mut LocomotionReadout>,
        ),
        Without<SimulationFault>,
    >,
) {
    let Some(physics) = physics else {
        return;
    };
    let dt = time.delta_secs();

    for (entity, mut controller, input, mut transform, readout) in query.iter_mut() {
        let input = input.map(|mut i| i.take()).unwrap_or_default();

        match controller.locomotion.step(physics.mover(), &input, dt) {
            Ok(_) => {}
            // Spawned after this tick's initialization pass.
            Err(LocomotionError::NotInitialized) => continue,
            Err(e) => {
                error!("Character {:?} faulted: {}", entity, e);
                commands.entity(entity).insert(SimulationFault);
                continue;
            }
        }

        let locomotion = &controller.locomotion;
        transform.translation = locomotion.position();
        transform.rotation = locomotion.body_rotation();
        if let Some(mut readout) = readout {
            *readout = locomotion.readout();
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Components for a new authoritative character.
pub fn character_bundle(config: LocomotionConfig, position: Vec3, yaw: f32) -> impl Bundle {
    let controller = CharacterController::new(config, position, yaw);
    let transform =
        Transform::from_translation(position).with_rotation(controller.locomotion.body_rotation());
    (
        controller,
        CharacterInput::default(),
        LocomotionReadout::default(),
        transform,
    )
}

/// Spawn a character with controller.
pub fn spawn_character(
    commands: &mut Commands,
    config: LocomotionConfig,
    position: Vec3,
    yaw: f32,
) -> Entity {
    commands.spawn(character_bundle(config, position, yaw)).id()
}
