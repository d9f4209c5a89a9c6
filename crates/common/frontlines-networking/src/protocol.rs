//! # Frontlines Network Protocol
//!
//! Defines the wire protocol between owners, the authoritative server and
//! observers:
//! - Channels (reliable-ordered for action edges, unreliable for axes and snapshots)
//! - Client messages (join, axes, action edges)
//! - Server messages (welcome, snapshots)
//!
//! Messages are encoded with `bincode`.

use bevy::prelude::*;
use frontlines_common::{ActionEdge, ActionKind, LocomotionState};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{NetworkError, NetworkResult};

// ============================================================================
// Protocol Version
// ============================================================================

/// Protocol version for compatibility checking.
pub const PROTOCOL_VERSION: u32 = 1;

// ============================================================================
// Channels
// ============================================================================

/// Network channel types for different message guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontlinesChannel {
    /// Reliable ordered channel: session control and discrete action edges.
    Reliable,
    /// Best-effort channel: per-tick axes and timestamped snapshots.
    Unreliable,
}

// ============================================================================
// Replicated Data
// ============================================================================

/// Network-replicated transform.
///
/// Characters never scale, so only position and rotation travel.
#[derive(Component, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
#[reflect(Component)]
pub struct NetworkTransform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for NetworkTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl NetworkTransform {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Create from Bevy Transform
    pub fn from_transform(transform: &Transform) -> Self {
        Self {
            position: transform.translation,
            rotation: transform.rotation,
        }
    }

    /// Convert to Bevy Transform
    pub fn to_transform(&self) -> Transform {
        Transform::from_translation(self.position).with_rotation(self.rotation)
    }

    /// Check if significantly different from another
    pub fn differs_from(&self, other: &Self, threshold: f32) -> bool {
        self.position.distance_squared(other.position) > threshold * threshold
            || self.rotation.angle_between(other.rotation) > threshold
    }
}

/// Continuous input, sent every tick. Newer ticks supersede older ones.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
pub struct InputAxes {
    pub tick: u64,
    pub move_axes: Vec2,
    pub look_axes: Vec2,
}

/// One discrete action edge. Never dropped or reordered.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActionEvent {
    /// Per-owner sequence number, strictly increasing
    pub seq: u64,
    /// Owner tick the edge was sampled on
    pub tick: u64,
    pub action: ActionKind,
    pub edge: ActionEdge,
}

/// Authoritative state of one character at one server tick.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct EntitySnapshot {
    pub net_id: u64,
    pub transform: NetworkTransform,
    pub state: LocomotionState,
    /// Server clock in seconds when the snapshot was taken
    pub timestamp: f64,
    pub server_tick: u64,
    /// Last owner input tick folded into this state
    pub last_input_tick: u64,
}

// ============================================================================
// Messages
// ============================================================================

/// Messages from a client to the server.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum ClientMessage {
    /// Join the session, as an input owner or as a pure observer.
    Join {
        version: u32,
        name: String,
        observer: bool,
    },
    Axes(InputAxes),
    Action(ActionEvent),
    Leave,
}

impl ClientMessage {
    pub fn channel(&self) -> FrontlinesChannel {
        match self {
            ClientMessage::Axes(_) => FrontlinesChannel::Unreliable,
            ClientMessage::Join { .. } | ClientMessage::Action(_) | ClientMessage::Leave => {
                FrontlinesChannel::Reliable
            }
        }
    }
}

/// Messages from the server to clients.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum ServerMessage {
    Welcome {
        client_id: u64,
        /// Character owned by this client, `None` for observers
        net_id: Option<u64>,
        session: Uuid,
        tick_rate: u32,
    },
    Snapshot(EntitySnapshot),
    Despawn { net_id: u64 },
    Rejected { code: u16, reason: String },
}

impl ServerMessage {
    pub fn channel(&self) -> FrontlinesChannel {
        match self {
            ServerMessage::Snapshot(_) => FrontlinesChannel::Unreliable,
            ServerMessage::Welcome { .. }
            | ServerMessage::Despawn { .. }
            | ServerMessage::Rejected { .. } => FrontlinesChannel::Reliable,
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

pub fn encode<T: Serialize>(message: &T) -> NetworkResult<Vec<u8>> {
    bincode::serialize(message).map_err(|e| NetworkError::SerializationError(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> NetworkResult<T> {
    bincode::deserialize(bytes).map_err(|e| NetworkError::DeserializationError(e.to_string()))
}
