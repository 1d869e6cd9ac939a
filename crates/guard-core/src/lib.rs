//! Core domain types for the trading guard.
//!
//! This crate provides the types shared by the controller and the enforcer:
//! - `Usd`, `Lots`: Precision-safe numeric types
//! - `Bias`, `Direction`, `TradeResult`: Trading enums
//! - `Position`, `TradeEvent`: Live venue data consumed by the rule engine
//! - `DailyRecord`: Per-day outcome used by the recovery-day rule
//! - `SessionState`: The shared session document, split into owner sections

pub mod decimal;
pub mod error;
pub mod session;
pub mod types;

pub use decimal::{Lots, Usd};
pub use error::{CoreError, Result};
pub use session::{
    Actor, ControllerSection, EnforcerSection, OwnedSection, SessionState, SCHEMA_VERSION,
};
pub use types::{
    Bias, DailyRecord, DayResult, Direction, Position, PositionId, TradeEvent, TradeEventKind,
    TradeResult,
};
