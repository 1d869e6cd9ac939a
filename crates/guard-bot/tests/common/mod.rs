//! Shared harness for the end-to-end tests: both actors on one store file.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Asia::Tehran;
use guard_bot::{AppConfig, AppResult, Controller, Enforcer, NewsCalendar, ProcessController};
use guard_bridge::{BridgeConfig, FileSessionStore, StoreConfig};
use guard_executor::PaperVenue;
use guard_persistence::JsonLinesJournal;
use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::TempDir;

pub type TestController = Controller<FileSessionStore, FakeTerminal, NoNews>;
pub type TestEnforcer = Enforcer<FileSessionStore, Arc<PaperVenue>, JsonLinesJournal, NoNews>;

/// Tehran wall clock on Monday 2026-03-02.
pub fn tehran(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Tehran
        .with_ymd_and_hms(2026, 3, 2, h, m, s)
        .unwrap()
        .with_timezone(&Utc)
}

pub struct NoNews;

impl NewsCalendar for NoNews {
    fn is_high_impact_window_active(&self, _now: DateTime<Utc>) -> bool {
        false
    }
}

#[derive(Debug, Default)]
pub struct TerminalState {
    pub running: bool,
    pub launches: u32,
    pub kills: u32,
}

/// Terminal double; clones share state so the test can inspect it.
#[derive(Debug, Clone, Default)]
pub struct FakeTerminal {
    pub state: Arc<Mutex<TerminalState>>,
}

impl FakeTerminal {
    pub fn launches(&self) -> u32 {
        self.state.lock().launches
    }

    pub fn kills(&self) -> u32 {
        self.state.lock().kills
    }

    /// The terminal died on its own.
    pub fn crash(&self) {
        self.state.lock().running = false;
    }
}

impl ProcessController for FakeTerminal {
    fn launch(&mut self) -> AppResult<()> {
        let mut state = self.state.lock();
        state.running = true;
        state.launches += 1;
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        self.state.lock().running
    }

    fn kill(&mut self) -> AppResult<()> {
        let mut state = self.state.lock();
        state.running = false;
        state.kills += 1;
        Ok(())
    }
}

/// A temp directory holding the store, history and journal.
pub struct Harness {
    pub dir: TempDir,
    pub config: AppConfig,
    pub venue: Arc<PaperVenue>,
    pub terminal: FakeTerminal,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.store = StoreConfig::at(dir.path().join("session.json"));
        config.bridge = BridgeConfig {
            read_interval_ms: 0,
            write_interval_ms: 0,
        };
        config.actuator.backoff_ms = 0;
        config.controller.history_path = dir.path().join("daily_history.jsonl");
        config.enforcer.journal_dir = dir.path().join("journal");
        Self {
            dir,
            config,
            venue: Arc::new(PaperVenue::new()),
            terminal: FakeTerminal::default(),
        }
    }

    pub fn store(&self) -> FileSessionStore {
        FileSessionStore::new(self.config.store.clone())
    }

    pub fn controller(&self, now: DateTime<Utc>) -> TestController {
        Controller::new(
            &self.config,
            self.store(),
            Some(self.terminal.clone()),
            NoNews,
            now,
        )
        .unwrap()
    }

    pub fn enforcer(&self, now: DateTime<Utc>) -> TestEnforcer {
        Enforcer::new(
            &self.config,
            self.store(),
            self.venue.clone(),
            JsonLinesJournal::new(&self.config.enforcer.journal_dir),
            NoNews,
            now,
        )
    }
}
