//! Rule engine error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
}

pub type RulesResult<T> = Result<T, RulesError>;
