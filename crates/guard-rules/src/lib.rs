//! Rule engine for the trading guard.
//!
//! - `config`: limits, cooldown, schedule and policy configuration with
//!   fail-closed validation
//! - `schedule`: trading calendar plus cooldown and loss-break deadlines
//! - `verdict`: verdict and flatten-order types
//! - `engine`: the pure per-tick evaluation and trade-event accounting

pub mod config;
pub mod engine;
pub mod error;
pub mod schedule;
pub mod verdict;

pub use config::{
    BiasPolicy, CooldownConfig, DailyBreak, LossBreakPolicy, RiskLimits, RulesConfig,
    ScheduleConfig, TimeWindow,
};
pub use engine::{Evaluation, RuleEngine, Tick};
pub use error::{RulesError, RulesResult};
pub use schedule::TradingCalendar;
pub use verdict::{BlockReason, FlattenOrder, FlattenReason, ShutdownReason, Verdict};
