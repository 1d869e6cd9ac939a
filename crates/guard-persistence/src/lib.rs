//! History and journal persistence for the trading guard.
//!
//! Both files are JSON Lines: one complete object per line, so a torn
//! write costs at most one record.
//!
//! - `history`: one DailyRecord per trading day, read back for the
//!   two-red-days recovery rule
//! - `journal`: append-only log of closed trades

pub mod error;
pub mod history;
pub mod journal;

pub use error::{PersistenceError, PersistenceResult};
pub use history::DailyHistory;
pub use journal::{JsonLinesJournal, TradeJournal, TradeRecord};
