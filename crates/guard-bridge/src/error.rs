//! Bridge error types.
//!
//! Every variant is transient from the protocol's point of view: the actor
//! keeps its last-known-good state and retries on the next tick.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed session document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Session store lock busy: {path} after {attempts} attempts")]
    LockBusy { path: String, attempts: u32 },

    #[error("Session store not adopted yet: {0}")]
    NotAdopted(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
