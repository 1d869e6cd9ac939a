//! Executor error types.

use guard_core::PositionId;
use thiserror::Error;

/// Errors reported by an execution venue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VenueError {
    /// Worth retrying (timeout, requote, busy trade context).
    #[error("Transient venue error: {0}")]
    Transient(String),

    /// The position does not exist (already closed).
    #[error("Position not found: {0}")]
    NotFound(PositionId),

    /// Refused; retrying the same request will not help.
    #[error("Venue rejected request: {0}")]
    Rejected(String),
}

pub type VenueResult<T> = Result<T, VenueError>;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Venue error: {0}")]
    Venue(#[from] VenueError),

    #[error("Could not close {position} after {attempts} attempts: {reason}")]
    CloseFailed {
        position: PositionId,
        attempts: u32,
        reason: String,
    },

    #[error("Invalid sizing input: {0}")]
    InvalidSizing(String),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
