//! # Network Ownership
//!
//! Each character has exactly one input owner. The server is always the
//! simulating authority; the owner only supplies input.
//!
//! - `client_id = 0`: server-owned (no remote input)
//! - `client_id > 0`: input comes from that client

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, NetworkResult};

/// Client ID reserved for the server itself.
pub const SERVER_CLIENT_ID: u64 = 0;

/// Which client supplies input for an entity.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Reflect)]
#[reflect(Component)]
pub struct NetworkOwner {
    /// Owning client ID (0 = server)
    pub client_id: u64,
    /// Tick when ownership was acquired
    pub acquired_tick: u64,
}

impl Default for NetworkOwner {
    fn default() -> Self {
        Self {
            client_id: SERVER_CLIENT_ID,
            acquired_tick: 0,
        }
    }
}

impl NetworkOwner {
    pub fn server() -> Self {
        Self::default()
    }

    pub fn client(client_id: u64, tick: u64) -> Self {
        Self {
            client_id,
            acquired_tick: tick,
        }
    }

    pub fn is_server_owned(&self) -> bool {
        self.client_id == SERVER_CLIENT_ID
    }

    pub fn is_owned_by(&self, client_id: u64) -> bool {
        self.client_id == client_id
    }

    /// Reject input for this entity from anyone but its owner.
    pub fn check_input_from(&self, client_id: u64) -> NetworkResult<()> {
        if self.is_owned_by(client_id) && !self.is_server_owned() {
            Ok(())
        } else {
            Err(NetworkError::NotOwner { client_id })
        }
    }
}
