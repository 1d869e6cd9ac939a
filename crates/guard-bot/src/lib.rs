//! Trading discipline guard processes.
//!
//! Two independently scheduled actors that share nothing but the session
//! document:
//! - Controller: operator commands, day bookkeeping, terminal lifecycle
//! - Enforcer: rule evaluation against live positions and force-closes

pub mod config;
pub mod controller;
pub mod enforcer;
pub mod error;
pub mod news;
pub mod paper_console;
pub mod process;

pub use config::AppConfig;
pub use controller::{render_status, Controller, ControllerCommand, StartOutcome};
pub use enforcer::{Enforcer, TickReport};
pub use error::{AppError, AppResult};
pub use news::{NewsCalendar, NewsEvent, ScheduledNews};
pub use paper_console::PaperCommand;
pub use process::{ProcessController, TerminalProcess};
