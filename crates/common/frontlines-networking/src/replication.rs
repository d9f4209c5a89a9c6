//! # Replication
//!
//! Server side: [`Replicated`] and [`ReplicatedState`] mark what gets
//! broadcast. Observer side: [`ObserverMirror`] holds the newest snapshot of a
//! remote character and moves a visual transform toward it each tick.
//!
//! Observers never run the locomotion simulation. The mirrored state enum is
//! only ever replaced by a newer snapshot.

use bevy::prelude::*;
use frontlines_common::LocomotionState;

use crate::config::ReplicationConfig;
use crate::error::{NetworkError, NetworkResult};
use crate::protocol::{EntitySnapshot, NetworkTransform};

// ============================================================================
// Server-side Components
// ============================================================================

/// Marks an entity for snapshot broadcast.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default, Reflect)]
#[reflect(Component)]
pub struct Replicated {
    /// Network ID (assigned by server)
    pub net_id: u64,
}

impl Replicated {
    pub fn new(net_id: u64) -> Self {
        Self { net_id }
    }
}

/// Locomotion state published with each snapshot.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default, Reflect)]
#[reflect(Component)]
pub struct ReplicatedState(pub LocomotionState);

// ============================================================================
// Observer Side
// ============================================================================

/// Client-side stand-in for a character simulated by the server.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Reflect)]
#[reflect(Component)]
pub struct RemoteCharacter {
    pub net_id: u64,
    /// This client owns the character's input
    pub owned: bool,
}

/// What happened to a received snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnapshotDisposition {
    Applied,
    /// Not newer than the held snapshot; discarded.
    Stale { received: f64, held: f64 },
}

impl SnapshotDisposition {
    pub fn is_applied(&self) -> bool {
        matches!(self, SnapshotDisposition::Applied)
    }

    pub fn into_result(self) -> NetworkResult<()> {
        match self {
            SnapshotDisposition::Applied => Ok(()),
            SnapshotDisposition::Stale { received, held } => {
                Err(NetworkError::SnapshotOutOfOrder { received, held })
            }
        }
    }
}

/// Interpolated view of one remote character.
#[derive(Component, Debug, Clone, PartialEq)]
pub struct ObserverMirror {
    catch_up_rate: f32,
    snap_epsilon: f32,
    visual: NetworkTransform,
    target: NetworkTransform,
    state: LocomotionState,
    timestamp: f64,
    server_tick: u64,
    last_input_tick: u64,
}

impl ObserverMirror {
    /// Start at the first snapshot, without interpolating from the origin.
    pub fn new(config: &ReplicationConfig, snapshot: &EntitySnapshot) -> Self {
        Self {
            catch_up_rate: config.catch_up_rate,
            snap_epsilon: config.snap_epsilon,
            visual: snapshot.transform,
            target: snapshot.transform,
            state: snapshot.state,
            timestamp: snapshot.timestamp,
            server_tick: snapshot.server_tick,
            last_input_tick: snapshot.last_input_tick,
        }
    }

    /// Take a snapshot if it is newer than the one held.
    pub fn receive(&mut self, snapshot: &EntitySnapshot) -> SnapshotDisposition {
        if snapshot.timestamp <= self.timestamp {
            debug!(
                "Discarding stale snapshot for net id {} (t={:.3} <= {:.3})",
                snapshot.net_id, snapshot.timestamp, self.timestamp
            );
            return SnapshotDisposition::Stale {
                received: snapshot.timestamp,
                held: self.timestamp,
            };
        }

        self.target = snapshot.transform;
        self.state = snapshot.state;
        self.timestamp = snapshot.timestamp;
        self.server_tick = snapshot.server_tick;
        self.last_input_tick = snapshot.last_input_tick;
        SnapshotDisposition::Applied
    }

    /// Move the visual transform a fixed fraction of the way to the target.
    pub fn step(&mut self, dt: f32) -> NetworkTransform {
        let t = (self.catch_up_rate * dt).clamp(0.0, 1.0);

        self.visual.position = self.visual.position.lerp(self.target.position, t);
        self.visual.rotation = self.visual.rotation.slerp(self.target.rotation, t);

        if self.visual.position.distance(self.target.position) < self.snap_epsilon
            && self.visual.rotation.angle_between(self.target.rotation) < self.snap_epsilon
        {
            self.visual = self.target;
        }
        self.visual
    }

    pub fn visual(&self) -> NetworkTransform {
        self.visual
    }

    pub fn target(&self) -> NetworkTransform {
        self.target
    }

    pub fn state(&self) -> LocomotionState {
        self.state
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn server_tick(&self) -> u64 {
        self.server_tick
    }

    pub fn last_input_tick(&self) -> u64 {
        self.last_input_tick
    }

    /// Remaining positional error.
    pub fn distance_to_target(&self) -> f32 {
        self.visual.position.distance(self.target.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn snapshot(position: Vec3, state: LocomotionState, timestamp: f64) -> EntitySnapshot {
        EntitySnapshot {
            net_id: 1,
            transform: NetworkTransform::new(position, Quat::IDENTITY),
            state,
            timestamp,
            server_tick: (timestamp * 60.0) as u64,
            last_input_tick: 0,
        }
    }

    fn mirror() -> ObserverMirror {
        ObserverMirror::new(
            &ReplicationConfig::default(),
            &snapshot(Vec3::ZERO, LocomotionState::Walking, 0.0),
        )
    }

    #[test]
    fn test_converges_with_strictly_decreasing_distance() {
        let mut mirror = mirror();
        let mut target = snapshot(Vec3::new(10.0, 0.0, -4.0), LocomotionState::Walking, 0.05);
        target.transform.rotation = Quat::from_rotation_y(1.2);
        mirror.receive(&target);

        let mut distance = mirror.distance_to_target();
        let mut ticks = 0;
        while distance > 0.0 {
            mirror.step(DT);
            let next = mirror.distance_to_target();
            assert!(next < distance, "distance did not shrink at tick {ticks}");
            distance = next;
            ticks += 1;
            assert!(ticks < 120, "did not converge");
        }
        assert_eq!(mirror.visual(), target.transform);
    }

    #[test]
    fn test_stale_snapshot_discarded() {
        let mut mirror = mirror();
        let newer = snapshot(Vec3::X, LocomotionState::Crouching, 1.0);
        assert!(mirror.receive(&newer).is_applied());

        let older = snapshot(Vec3::Y, LocomotionState::Prone, 0.5);
        let disposition = mirror.receive(&older);
        assert_eq!(
            disposition,
            SnapshotDisposition::Stale {
                received: 0.5,
                held: 1.0
            }
        );
        assert!(matches!(
            disposition.into_result(),
            Err(NetworkError::SnapshotOutOfOrder { .. })
        ));
        assert_eq!(mirror.state(), LocomotionState::Crouching);
        assert_eq!(mirror.target().position, Vec3::X);
    }

    #[test]
    fn test_duplicate_snapshot_discarded() {
        let mut mirror = mirror();
        let snap = snapshot(Vec3::X, LocomotionState::Aiming, 1.0);
        assert!(mirror.receive(&snap).is_applied());
        assert!(!mirror.receive(&snap).is_applied());
    }

    #[test]
    fn test_mirrored_state_persists_without_updates() {
        let mut mirror = ObserverMirror::new(
            &ReplicationConfig::default(),
            &snapshot(Vec3::ZERO, LocomotionState::Sprinting, 0.0),
        );
        for _ in 0..60 {
            mirror.step(DT);
        }
        assert_eq!(mirror.state(), LocomotionState::Sprinting);
    }

    #[test]
    fn test_first_snapshot_is_not_interpolated() {
        let mirror = ObserverMirror::new(
            &ReplicationConfig::default(),
            &snapshot(Vec3::new(5.0, 1.0, 5.0), LocomotionState::Walking, 3.0),
        );
        assert_eq!(mirror.visual().position, Vec3::new(5.0, 1.0, 5.0));
        assert_eq!(mirror.distance_to_target(), 0.0);
    }
}
