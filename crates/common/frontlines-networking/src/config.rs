//! # Network Configuration
//!
//! Central configuration for Frontlines networking.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Main Config
// ============================================================================

/// Main network configuration resource.
///
/// Insert this before adding [`crate::FrontlinesNetworkingPlugin`] to customize behavior.
#[derive(Resource, Debug, Clone, PartialEq, Default, Serialize, Deserialize, Reflect)]
#[reflect(Resource)]
#[serde(default)]
pub struct NetworkConfig {
    /// Tick rate configuration
    pub tick: TickConfig,

    /// Transport layer configuration
    pub transport: TransportConfig,

    /// Replication settings
    pub replication: ReplicationConfig,
}

// ============================================================================
// Tick Configuration
// ============================================================================

/// Fixed simulation rate of the authoritative side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Reflect)]
#[serde(default)]
pub struct TickConfig {
    /// Main simulation tick rate (Hz)
    pub tick_rate: u32,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self { tick_rate: 60 }
    }
}

impl TickConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn delta_secs(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }
}

// ============================================================================
// Transport Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Reflect)]
#[serde(default)]
pub struct TransportConfig {
    /// Port reported in the server status line
    pub port: u16,

    /// Maximum concurrent connections
    pub max_connections: usize,

    /// Maximum packet size (bytes)
    pub max_packet_size: usize,

    /// Unacknowledged inputs an owner keeps before dropping the oldest
    pub input_buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 7777,
            max_connections: 16,
            max_packet_size: 1400, // MTU-safe
            input_buffer_size: 256,
        }
    }
}

// ============================================================================
// Replication Configuration
// ============================================================================

/// Snapshot broadcast and observer interpolation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Reflect)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Snapshots per second broadcast to observers
    pub snapshot_rate: u32,

    /// Fraction of the remaining distance an observer covers per second
    pub catch_up_rate: f32,

    /// Distance under which an observer snaps onto its target
    pub snap_epsilon: f32,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            snapshot_rate: 20,
            catch_up_rate: 10.0,
            snap_epsilon: 1e-3,
        }
    }
}

impl ReplicationConfig {
    /// Seconds between two snapshots.
    pub fn snapshot_interval(&self) -> f32 {
        1.0 / self.snapshot_rate.max(1) as f32
    }
}

// ============================================================================
// Runtime State
// ============================================================================

/// Current network state (runtime, not serialized).
#[derive(Resource, Debug, Clone, Default)]
pub struct NetworkState {
    /// Current tick number
    pub tick: u64,

    /// Connected client count
    pub client_count: usize,

    /// Snapshots queued since startup
    pub snapshots_sent: u64,

    /// Bytes sent this second
    pub bytes_sent: u64,

    /// Bytes received this second
    pub bytes_received: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rates() {
        let config = NetworkConfig::default();
        assert_eq!(config.tick.tick_rate, 60);
        assert_eq!(config.replication.snapshot_rate, 20);
        assert!((config.replication.snapshot_interval() - 0.05).abs() < 1e-6);
        assert_eq!(config.tick.tick_duration(), Duration::from_secs_f64(1.0 / 60.0));
    }

    #[test]
    fn test_zero_rates_do_not_divide_by_zero() {
        let tick = TickConfig { tick_rate: 0 };
        assert_eq!(tick.delta_secs(), 1.0);
        let replication = ReplicationConfig {
            snapshot_rate: 0,
            ..default()
        };
        assert_eq!(replication.snapshot_interval(), 1.0);
    }
}
