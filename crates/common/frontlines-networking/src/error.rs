//! # Network Errors
//!
//! Error types for Frontlines networking.

use thiserror::Error;

/// Network error types.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    // ========================================================================
    // Connection Errors
    // ========================================================================

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Connection refused: nothing listening on port {0}")]
    ConnectionRefused(u16),

    #[error("Maximum connections reached ({0})")]
    MaxConnectionsReached(usize),

    #[error("Unknown client {0}")]
    UnknownClient(u64),

    // ========================================================================
    // Transport Errors
    // ========================================================================

    #[error("Packet too large: {size} > {max}")]
    PacketTooLarge { size: usize, max: usize },

    // ========================================================================
    // Protocol Errors
    // ========================================================================

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Version mismatch: client={client}, server={server}")]
    VersionMismatch { client: u32, server: u32 },

    // ========================================================================
    // Replication Errors
    // ========================================================================

    #[error("Snapshot out of order: received t={received:.3} <= held t={held:.3}")]
    SnapshotOutOfOrder { received: f64, held: f64 },

    // ========================================================================
    // Ownership Errors
    // ========================================================================

    #[error("Client {client_id} does not own an entity")]
    NotOwner { client_id: u64 },

    // ========================================================================
    // State Errors
    // ========================================================================

    #[error("Not connected")]
    NotConnected,
}

impl NetworkError {
    /// Check if this error only affects one packet; the session carries on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            NetworkError::DeserializationError(_)
                | NetworkError::SnapshotOutOfOrder { .. }
                | NetworkError::NotOwner { .. }
        )
    }

    /// Check if this error should disconnect the client.
    pub fn should_disconnect(&self) -> bool {
        matches!(
            self,
            NetworkError::VersionMismatch { .. }
                | NetworkError::MaxConnectionsReached(_)
                | NetworkError::ConnectionRefused(_)
                | NetworkError::ConnectionClosed(_)
        )
    }

    /// Get error code for network transmission.
    pub fn code(&self) -> u16 {
        match self {
            NetworkError::ConnectionClosed(_) => 1001,
            NetworkError::ConnectionRefused(_) => 1002,
            NetworkError::MaxConnectionsReached(_) => 1003,
            NetworkError::UnknownClient(_) => 1005,
            NetworkError::PacketTooLarge { .. } => 2005,
            NetworkError::SerializationError(_) => 3001,
            NetworkError::DeserializationError(_) => 3002,
            NetworkError::VersionMismatch { .. } => 3004,
            NetworkError::SnapshotOutOfOrder { .. } => 4003,
            NetworkError::NotOwner { .. } => 5002,
            NetworkError::NotConnected => 7000,
        }
    }
}

/// Result type for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;
