//! Trade journal.
//!
//! Closed trades are appended to `trades_YYYY-MM-DD.jsonl` in the journal
//! directory, one file per UTC day of the close. Files are opened in append
//! mode, so a restart never truncates earlier records.

use crate::error::PersistenceResult;
use chrono::{DateTime, Utc};
use guard_core::{TradeEvent, TradeEventKind};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Receives closed-trade notifications. Nothing reads back from it.
pub trait TradeJournal: Send {
    fn record(&mut self, event: &TradeEvent) -> PersistenceResult<()>;
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: TradeEvent,
}

struct ActiveFile {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

/// JSON Lines trade journal with daily rotation.
pub struct JsonLinesJournal {
    base_dir: PathBuf,
    active: Option<ActiveFile>,
}

impl JsonLinesJournal {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        if let Err(e) = std::fs::create_dir_all(&base_dir) {
            warn!(?e, dir = %base_dir.display(), "Failed to create journal directory");
        }
        Self {
            base_dir,
            active: None,
        }
    }

    fn writer_for(&mut self, date: &str) -> PersistenceResult<&mut ActiveFile> {
        if self.active.as_ref().is_some_and(|a| a.date != date) {
            self.close_active();
        }
        let active = match self.active.take() {
            Some(active) => active,
            None => {
                let path = self.base_dir.join(format!("trades_{date}.jsonl"));
                info!(path = %path.display(), "Opening trade journal (append mode)");
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                ActiveFile {
                    writer: BufWriter::new(file),
                    date: date.to_string(),
                    records_written: 0,
                }
            }
        };
        Ok(self.active.insert(active))
    }

    fn close_active(&mut self) {
        if let Some(mut active) = self.active.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush journal on close");
            }
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed trade journal"
            );
        }
    }
}

impl TradeJournal for JsonLinesJournal {
    /// Opens are ignored; only closed trades are journaled.
    fn record(&mut self, event: &TradeEvent) -> PersistenceResult<()> {
        if event.kind != TradeEventKind::Close {
            return Ok(());
        }
        let record = TradeRecord {
            recorded_at: Utc::now(),
            event: event.clone(),
        };
        let date = event.at.format("%Y-%m-%d").to_string();
        let line = serde_json::to_string(&record)?;

        let active = self.writer_for(&date)?;
        writeln!(active.writer, "{line}")?;
        active.writer.flush()?;
        active.records_written += 1;
        debug!(position = %event.position_id, "Journaled closed trade");
        Ok(())
    }
}

impl Drop for JsonLinesJournal {
    fn drop(&mut self) {
        self.close_active();
    }
}
