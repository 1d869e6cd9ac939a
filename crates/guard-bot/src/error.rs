//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] guard_bridge::BridgeError),

    #[error("Rules error: {0}")]
    Rules(#[from] guard_rules::RulesError),

    #[error("Executor error: {0}")]
    Executor(#[from] guard_executor::ExecutorError),

    #[error("Venue error: {0}")]
    Venue(#[from] guard_executor::VenueError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] guard_persistence::PersistenceError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] guard_telemetry::TelemetryError),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Invalid command: {0}")]
    Command(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
