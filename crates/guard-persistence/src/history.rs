//! Daily history.
//!
//! One [`DailyRecord`] per trading day, kept sorted by date. Recording a
//! day that already exists replaces it, so ending a day twice (manual end
//! after an auto-shutdown) does not duplicate it.

use crate::error::PersistenceResult;
use chrono::NaiveDate;
use guard_core::{DailyRecord, DayResult};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Daily history file.
#[derive(Debug, Clone)]
pub struct DailyHistory {
    path: PathBuf,
}

impl DailyHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records, oldest first. Unreadable lines are skipped.
    pub fn load(&self) -> PersistenceResult<Vec<DailyRecord>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DailyRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(?e, line = n + 1, "Skipping unreadable history line"),
            }
        }
        records.sort_by_key(|r| r.date);
        Ok(records)
    }

    /// Insert or replace the record for its date.
    pub fn record_day(&self, record: DailyRecord) -> PersistenceResult<()> {
        let mut records = self.load()?;
        records.retain(|r| r.date != record.date);
        info!(
            date = %record.date,
            net_pnl = %record.net_pnl,
            trades = record.trades,
            result = ?record.result,
            "Recording trading day"
        );
        records.push(record);
        records.sort_by_key(|r| r.date);
        self.rewrite(&records)
    }

    fn rewrite(&self, records: &[DailyRecord]) -> PersistenceResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let mut file = File::create(&tmp)?;
        for record in records {
            writeln!(file, "{}", serde_json::to_string(record)?)?;
        }
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// The last `n` completed days before `today`, oldest first.
    pub fn last_n_days(&self, n: usize, today: NaiveDate) -> PersistenceResult<Vec<DailyRecord>> {
        let records = self.load()?;
        let completed: Vec<DailyRecord> = records.into_iter().filter(|r| r.date < today).collect();
        let skip = completed.len().saturating_sub(n);
        Ok(completed.into_iter().skip(skip).collect())
    }

    /// True when the two most recent completed days were both red.
    pub fn is_recovery_day(&self, today: NaiveDate) -> PersistenceResult<bool> {
        let last = self.last_n_days(2, today)?;
        Ok(last.len() == 2 && last.iter().all(|r| r.result == DayResult::Red))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guard_core::Usd;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn history(dir: &TempDir) -> DailyHistory {
        DailyHistory::new(dir.path().join("history.jsonl"))
    }

    #[test]
    fn test_empty_history() {
        let dir = TempDir::new().unwrap();
        let h = history(&dir);
        assert!(h.load().unwrap().is_empty());
        assert!(!h.is_recovery_day(day(5)).unwrap());
    }

    #[test]
    fn test_two_red_days_is_recovery() {
        let dir = TempDir::new().unwrap();
        let h = history(&dir);
        h.record_day(DailyRecord::new(day(2), Usd::new(dec!(-20)), 3)).unwrap();
        h.record_day(DailyRecord::new(day(3), Usd::new(dec!(-5)), 1)).unwrap();
        assert!(h.is_recovery_day(day(4)).unwrap());
    }

    #[test]
    fn test_green_or_flat_day_breaks_the_streak() {
        let dir = TempDir::new().unwrap();
        let h = history(&dir);
        h.record_day(DailyRecord::new(day(1), Usd::new(dec!(-20)), 3)).unwrap();
        h.record_day(DailyRecord::new(day(2), Usd::ZERO, 0)).unwrap();
        h.record_day(DailyRecord::new(day(3), Usd::new(dec!(-5)), 1)).unwrap();
        assert!(!h.is_recovery_day(day(4)).unwrap());

        h.record_day(DailyRecord::new(day(4), Usd::new(dec!(-1)), 1)).unwrap();
        assert!(h.is_recovery_day(day(5)).unwrap());
    }

    #[test]
    fn test_today_is_not_a_completed_day() {
        let dir = TempDir::new().unwrap();
        let h = history(&dir);
        h.record_day(DailyRecord::new(day(3), Usd::new(dec!(-5)), 1)).unwrap();
        h.record_day(DailyRecord::new(day(4), Usd::new(dec!(-5)), 1)).unwrap();
        assert!(!h.is_recovery_day(day(4)).unwrap());
    }

    #[test]
    fn test_record_day_upserts() {
        let dir = TempDir::new().unwrap();
        let h = history(&dir);
        h.record_day(DailyRecord::new(day(3), Usd::new(dec!(-5)), 1)).unwrap();
        h.record_day(DailyRecord::new(day(2), Usd::new(dec!(4)), 2)).unwrap();
        h.record_day(DailyRecord::new(day(3), Usd::new(dec!(7)), 2)).unwrap();

        let all = h.load().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].date, day(2));
        assert_eq!(all[1].result, DayResult::Green);
    }

    #[test]
    fn test_unreadable_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let h = history(&dir);
        h.record_day(DailyRecord::new(day(3), Usd::new(dec!(-5)), 1)).unwrap();
        let mut raw = fs::read_to_string(h.path()).unwrap();
        raw.push_str("{ torn\n");
        fs::write(h.path(), raw).unwrap();
        assert_eq!(h.load().unwrap().len(), 1);
    }
}
