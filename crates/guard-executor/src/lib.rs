//! Enforcement actuator for the trading guard.
//!
//! The only component that touches the execution venue:
//! - `venue`: capability trait (list positions, close, poll trade events)
//! - `paper`: in-memory venue for dry runs and tests
//! - `actuator`: idempotent force-close with bounded retries
//! - `sizing`: lot size for a dollar risk

pub mod actuator;
pub mod error;
pub mod paper;
pub mod sizing;
pub mod venue;

pub use actuator::{ActuatorConfig, CloseOutcome, CloseReport, EnforcementActuator};
pub use error::{ExecutorError, ExecutorResult, VenueError, VenueResult};
pub use paper::PaperVenue;
pub use sizing::{lots_for_risk, SizingConfig};
pub use venue::{BoxFuture, DynVenue, ExecutionVenue};
