//! # Replication Sync
//!
//! Glue between the locomotion driver and `frontlines-networking`.
//!
//! ## Server
//!
//! | Network event | Runtime effect |
//! |---------------|----------------|
//! | `ClientJoined` with a net id | spawn an owned, replicated character |
//! | `ClientLeft` with a net id | despawn that character |
//! | after each step | copy the machine state into `ReplicatedState` |
//!
//! ## Client
//!
//! Mirrored characters get a [`LocomotionReadout`] rebuilt from the received
//! state enum; nothing on the client ever steps a [`Locomotion`](crate::locomotion::Locomotion).

use bevy::prelude::*;
use frontlines_networking::client::interpolate_remote_characters;
use frontlines_networking::prelude::*;

use crate::character::{character_bundle, initialize_characters, step_characters, CharacterController, LocomotionSet};
use crate::config::LocomotionConfig;
use crate::locomotion::LocomotionReadout;

// ============================================================================
// Spawn Layout
// ============================================================================

/// Where joined players' characters appear.
#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct SpawnLayout {
    pub origin: Vec3,
    /// Distance between consecutive characters along +X
    pub spacing: f32,
}

impl Default for SpawnLayout {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            spacing: 2.0,
        }
    }
}

impl SpawnLayout {
    pub fn position_for(&self, net_id: u64) -> Vec3 {
        self.origin + Vec3::X * self.spacing * net_id.saturating_sub(1) as f32
    }
}

// ============================================================================
// Replication Sync Plugin
// ============================================================================

/// Plugin for locomotion <-> network sync.
pub struct ReplicationSyncPlugin;

impl Plugin for ReplicationSyncPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SpawnLayout>()
            .add_message::<ClientJoined>()
            .add_message::<ClientLeft>()
            .configure_sets(
                FixedUpdate,
                LocomotionSet::Simulate
                    .after(NetworkSet::Receive)
                    .before(NetworkSet::Publish),
            )
            .add_systems(
                FixedUpdate,
                (
                    (spawn_joined_characters, despawn_departed_characters)
                        .before(initialize_characters)
                        .run_if(resource_exists::<ServerHost>),
                    sync_replicated_state.after(step_characters),
                )
                    .in_set(LocomotionSet::Simulate),
            )
            .add_systems(
                FixedUpdate,
                mirror_remote_readout
                    .after(interpolate_remote_characters)
                    .in_set(NetworkSet::Publish),
            );
    }
}

// ============================================================================
// Server Systems
// ============================================================================

/// Spawn a character for every owner that joined this tick.
pub fn spawn_joined_characters(
    mut commands: Commands,
    mut joined: MessageReader<ClientJoined>,
    config: Res<LocomotionConfig>,
    layout: Res<SpawnLayout>,
    state: Res<NetworkState>,
) {
    for event in joined.read() {
        let Some(net_id) = event.net_id else {
            continue;
        };
        let position = layout.position_for(net_id);
        commands.spawn((
            character_bundle(config.clone(), position, 0.0),
            Replicated::new(net_id),
            ReplicatedState::default(),
            NetworkOwner::client(event.client_id, state.tick),
            Name::new(event.name.clone()),
        ));
        info!(
            "Spawned character {} for client {} ({}) at {}",
            net_id, event.client_id, event.name, position
        );
    }
}

/// Remove the characters of clients that left.
pub fn despawn_departed_characters(
    mut commands: Commands,
    mut left: MessageReader<ClientLeft>,
    query: Query<(Entity, &Replicated)>,
) {
    for event in left.read() {
        let Some(net_id) = event.net_id else {
            continue;
        };
        for (entity, replicated) in query.iter() {
            if replicated.net_id == net_id {
                commands.entity(entity).despawn();
                info!("Despawned character {} of client {}", net_id, event.client_id);
            }
        }
    }
}

/// Copy the simulated state into the component snapshots are built from.
pub fn sync_replicated_state(mut query: Query<(&CharacterController, &mut ReplicatedState)>) {
    for (controller, mut replicated) in query.iter_mut() {
        let state = controller.locomotion.state();
        if replicated.0 != state {
            replicated.0 = state;
        }
    }
}

// ============================================================================
// Client Systems
// ============================================================================

/// Rebuild the presentation readout of mirrored characters from their state.
pub fn mirror_remote_readout(
    mut commands: Commands,
    mut query: Query<
        (Entity, &ReplicatedState, Option<&mut LocomotionReadout>),
        (With<RemoteCharacter>, Changed<ReplicatedState>),
    >,
) {
    for (entity, state, readout) in query.iter_mut() {
        let mirrored = LocomotionReadout::mirrored(state.0);
        match readout {
            Some(mut readout) => *readout = mirrored,
            None => {
                commands.entity(entity).insert(mirrored);
            }
        }
    }
}
