//! # Locomotion Errors
//!
//! Only configuration faults are errors. Illegal transitions are no-ops and
//! stamina underflow is prevented by clamping.

use thiserror::Error;

/// Locomotion error types.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocomotionError {
    // ========================================================================
    // Configuration Faults (fatal for the entity)
    // ========================================================================

    #[error("Missing required collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error("Invalid locomotion config: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================

    #[error("Locomotion stepped before initialize()")]
    NotInitialized,

    #[error("Locomotion simulation faulted: {0}")]
    Faulted(String),
}

impl LocomotionError {
    /// Configuration faults stop the entity's simulation permanently.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LocomotionError::MissingCollaborator(_)
                | LocomotionError::InvalidConfig(_)
                | LocomotionError::Faulted(_)
        )
    }
}

/// Result type for locomotion operations.
pub type LocomotionResult<T> = Result<T, LocomotionError>;
