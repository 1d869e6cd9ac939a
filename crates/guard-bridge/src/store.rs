//! Session store medium.
//!
//! A single JSON document on local disk:
//! - Missing file reads as the default document
//! - Writers serialize through a sidecar `<path>.lock` created exclusively
//! - Writes land in a temporary sibling that is renamed over the document,
//!   so a reader never observes a half-written file
//! - Readers never lock
//!
//! The store is synchronous. Each actor is a single polling loop whose tick
//! consists of store I/O plus evaluation, so a busy lock stalls only that
//! actor's own tick, for at most [`StoreConfig::max_lock_wait`].

use crate::error::{BridgeError, BridgeResult};
use guard_core::SessionState;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Read/write access to the shared session document.
pub trait SessionStore: Send + Sync {
    /// Read the whole document. A missing document yields defaults.
    fn load(&self) -> BridgeResult<SessionState>;

    /// Replace the whole document. Callers hold the lock.
    fn store(&self, state: &SessionState) -> BridgeResult<()>;

    /// Take the writer lock. Released when the guard drops.
    ///
    /// Blocks the calling thread while the lock is busy, bounded by the
    /// store's retry settings.
    fn lock(&self) -> BridgeResult<StoreLock>;
}

/// Writer lock guard.
#[derive(Debug)]
pub struct StoreLock {
    path: Option<PathBuf>,
}

impl StoreLock {
    /// A lock with nothing to release, for stores without a lock file.
    #[must_use]
    pub fn unlocked() -> Self {
        Self { path: None }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = fs::remove_file(&path) {
                warn!(?e, path = %path.display(), "Failed to release session lock");
            }
        }
    }
}

/// File store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Lock acquisition attempts before giving up.
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,
    #[serde(default = "default_lock_retry_delay_ms")]
    pub lock_retry_delay_ms: u64,
    /// A lock file older than this is assumed abandoned and broken.
    #[serde(default = "default_stale_lock_secs")]
    pub stale_lock_secs: u64,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/session.json")
}

fn default_lock_retries() -> u32 {
    20
}

fn default_lock_retry_delay_ms() -> u64 {
    50
}

fn default_stale_lock_secs() -> u64 {
    10
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            lock_retries: default_lock_retries(),
            lock_retry_delay_ms: default_lock_retry_delay_ms(),
            stale_lock_secs: default_stale_lock_secs(),
        }
    }
}

impl StoreConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Longest time `lock` sleeps before reporting the lock busy
    /// (950 ms with the defaults).
    pub fn max_lock_wait(&self) -> Duration {
        Duration::from_millis(
            self.lock_retry_delay_ms
                .saturating_mul(u64::from(self.lock_retries.max(1) - 1)),
        )
    }
}

/// JSON file session store.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    config: StoreConfig,
    lock_path: PathBuf,
    tmp_path: PathBuf,
}

impl FileSessionStore {
    pub fn new(config: StoreConfig) -> Self {
        let lock_path = sibling(&config.path, "lock");
        let tmp_path = sibling(&config.path, "tmp");
        Self {
            config,
            lock_path,
            tmp_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn lock_is_stale(&self) -> bool {
        let Ok(meta) = fs::metadata(&self.lock_path) else {
            return false;
        };
        let Ok(modified) = meta.modified() else {
            return false;
        };
        SystemTime::now()
            .duration_since(modified)
            .map(|age| age > Duration::from_secs(self.config.stale_lock_secs))
            .unwrap_or(false)
    }
}

/// `session.json` -> `session.json.<ext>`
fn sibling(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> BridgeResult<SessionState> {
        let raw = match fs::read_to_string(&self.config.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(SessionState::default()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(SessionState::default());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn store(&self, state: &SessionState) -> BridgeResult<()> {
        if let Some(parent) = self.config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let body = serde_json::to_vec_pretty(state)?;

        let mut file = File::create(&self.tmp_path)?;
        file.write_all(&body)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.tmp_path, &self.config.path)?;
        debug!(path = %self.config.path.display(), "Session document written");
        Ok(())
    }

    fn lock(&self) -> BridgeResult<StoreLock> {
        if let Some(parent) = self.lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let attempts = self.config.lock_retries.max(1);
        for attempt in 1..=attempts {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_path)
            {
                Ok(mut file) => {
                    // Owner pid is informational only.
                    let _ = write!(file, "{}", std::process::id());
                    return Ok(StoreLock {
                        path: Some(self.lock_path.clone()),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if self.lock_is_stale() {
                        warn!(
                            path = %self.lock_path.display(),
                            "Breaking stale session lock"
                        );
                        let _ = fs::remove_file(&self.lock_path);
                        continue;
                    }
                    if attempt < attempts {
                        std::thread::sleep(Duration::from_millis(self.config.lock_retry_delay_ms));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(
            path = %self.lock_path.display(),
            attempts,
            waited_ms = self.config.max_lock_wait().as_millis() as u64,
            "Session lock busy; write retried next tick"
        );
        Err(BridgeError::LockBusy {
            path: self.lock_path.display().to_string(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guard_core::{Bias, Usd};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> FileSessionStore {
        let mut config = StoreConfig::at(dir.path().join("session.json"));
        config.lock_retries = 3;
        config.lock_retry_delay_ms = 1;
        FileSessionStore::new(config)
    }

    #[test]
    fn test_missing_file_reads_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.load().unwrap(), SessionState::default());
    }

    #[test]
    fn test_store_then_load() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut state = SessionState::default();
        state.controller.bias = Bias::Bearish;
        state.enforcer.daily_loss_usd = Usd::new(dec!(12.5));
        store.store(&state).unwrap();

        assert_eq!(store.load().unwrap(), state);
        assert!(!store.tmp_path.exists());
    }

    #[test]
    fn test_store_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(StoreConfig::at(dir.path().join("nested/session.json")));
        store.store(&SessionState::default()).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(store.load(), Err(BridgeError::Malformed(_))));
    }

    #[test]
    fn test_empty_document_reads_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "  \n").unwrap();
        assert_eq!(store.load().unwrap(), SessionState::default());
    }

    #[test]
    fn test_lock_is_exclusive_and_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let guard = store.lock().unwrap();
        assert!(store.lock_path.exists());
        assert!(matches!(store.lock(), Err(BridgeError::LockBusy { attempts: 3, .. })));

        drop(guard);
        assert!(!store.lock_path.exists());
        assert!(store.lock().is_ok());
    }

    #[test]
    fn test_busy_lock_gives_up_within_bound() {
        let dir = TempDir::new().unwrap();
        let mut config = StoreConfig::at(dir.path().join("session.json"));
        config.lock_retries = 4;
        config.lock_retry_delay_ms = 20;
        assert_eq!(config.max_lock_wait(), Duration::from_millis(60));
        let store = FileSessionStore::new(config);

        let _held = store.lock().unwrap();
        let started = std::time::Instant::now();
        assert!(matches!(store.lock(), Err(BridgeError::LockBusy { attempts: 4, .. })));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(60));
        assert!(waited < Duration::from_millis(1000));
    }

    #[test]
    fn test_default_lock_wait_bound() {
        assert_eq!(StoreConfig::default().max_lock_wait(), Duration::from_millis(950));
    }

    #[test]
    fn test_stale_lock_is_broken() {
        let dir = TempDir::new().unwrap();
        let mut config = StoreConfig::at(dir.path().join("session.json"));
        config.stale_lock_secs = 0;
        config.lock_retry_delay_ms = 1;
        let store = FileSessionStore::new(config);

        fs::write(&store.lock_path, "4242").unwrap();
        std::thread::sleep(Duration::from_millis(1100));
        assert!(store.lock().is_ok());
    }
}
