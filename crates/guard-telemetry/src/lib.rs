//! Prometheus metrics, structured logging, and operator alerts.
//!
//! - Structured logging with tracing (JSON in production, pretty otherwise)
//! - Prometheus metrics for verdicts, flatten attempts, store I/O
//! - `OperatorAlert`: a warning that repeats every tick while a dangerous
//!   condition persists, so risk exposure is never silent

pub mod alert;
pub mod error;
pub mod logging;
pub mod metrics;

pub use alert::OperatorAlert;
pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
