//! Controller/enforcer bridge protocol.
//!
//! Each actor owns a [`SessionBridge`] typed by the section it writes. The
//! bridge keeps a shadow copy of the whole document (the last-known-good
//! merged view), throttles reads and writes, and merges on write by
//! re-reading the document under the lock and replacing only the owned
//! section. The other role's fields are never written from the shadow
//! unless the document on disk is malformed, in which case the shadow
//! replaces it.

use crate::error::{BridgeError, BridgeResult};
use crate::store::SessionStore;
use chrono::{DateTime, Duration, Utc};
use guard_core::{OwnedSection, SessionState, SCHEMA_VERSION};
use guard_telemetry::{Metrics, OperatorAlert};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Consecutive store failures before the operator alert fires.
const STORE_ALERT_THRESHOLD: u32 = 3;

/// Bridge I/O pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_interval_ms")]
    pub read_interval_ms: u64,
    #[serde(default = "default_interval_ms")]
    pub write_interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    2000
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            read_interval_ms: default_interval_ms(),
            write_interval_ms: default_interval_ms(),
        }
    }
}

impl BridgeConfig {
    fn read_interval(&self) -> Duration {
        Duration::milliseconds(self.read_interval_ms as i64)
    }

    fn write_interval(&self) -> Duration {
        Duration::milliseconds(self.write_interval_ms as i64)
    }
}

/// Result of [`SessionBridge::read`].
#[derive(Debug)]
pub enum ReadOutcome {
    /// The document was read and merged into the shadow.
    Fresh,
    /// Throttled; the shadow is unchanged.
    Cached,
    /// The read failed; the shadow is the last-known-good copy.
    Stale(BridgeError),
}

impl ReadOutcome {
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale(_))
    }
}

/// Result of [`SessionBridge::publish`].
#[derive(Debug)]
pub enum PublishOutcome {
    /// Identical to what is already persisted; nothing written.
    Unchanged,
    /// Changed but throttled (or not yet adopted); retried on a later call.
    Deferred,
    /// Written with this sequence number.
    Written(u64),
    /// The write failed; the section stays dirty.
    Failed(BridgeError),
}

/// One actor's view of the shared session document.
pub struct SessionBridge<S: OwnedSection, St: SessionStore> {
    store: St,
    config: BridgeConfig,
    /// Merged last-known-good document. The owned section is always `local`.
    shadow: SessionState,
    /// The owned section as this actor last decided it.
    local: S,
    /// The owned section as last successfully persisted.
    persisted: Option<S>,
    /// Own section has been read from the store at least once.
    adopted: bool,
    /// The last read found a document that does not parse.
    malformed: bool,
    last_read: Option<DateTime<Utc>>,
    last_write: Option<DateTime<Utc>>,
    read_alert: OperatorAlert,
    write_alert: OperatorAlert,
}

impl<S: OwnedSection, St: SessionStore> SessionBridge<S, St> {
    /// Open a bridge and adopt the owned section from the store.
    ///
    /// If the store cannot be read the bridge starts from defaults and does
    /// not write until a later read succeeds. Decisions taken meanwhile are
    /// folded into the stored section on adoption, so neither a restart nor
    /// an outage resets protected counters. A malformed document is the
    /// exception: nothing in it can be recovered, and the next write
    /// replaces it from the shadow.
    pub fn open(store: St, config: BridgeConfig, now: DateTime<Utc>) -> Self {
        let mut bridge = Self {
            store,
            config,
            shadow: SessionState::default(),
            local: S::from_state(&SessionState::default()).clone(),
            persisted: None,
            adopted: false,
            malformed: false,
            last_read: None,
            last_write: None,
            read_alert: OperatorAlert::new("session_store_read", STORE_ALERT_THRESHOLD),
            write_alert: OperatorAlert::new("session_store_write", STORE_ALERT_THRESHOLD),
        };
        if let ReadOutcome::Stale(e) = bridge.force_read(now) {
            warn!(actor = %S::OWNER, error = %e, "Session store unreadable at start-up");
        }
        bridge
    }

    /// Merged view of the document.
    pub fn view(&self) -> &SessionState {
        &self.shadow
    }

    /// The owned section as currently decided.
    pub fn local(&self) -> &S {
        &self.local
    }

    pub fn is_adopted(&self) -> bool {
        self.adopted
    }

    /// A locally decided change has not reached the store yet.
    pub fn is_dirty(&self) -> bool {
        self.persisted.as_ref() != Some(&self.local)
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    /// Read the document unless a read happened within the read interval.
    pub fn read(&mut self, now: DateTime<Utc>) -> ReadOutcome {
        if let Some(last) = self.last_read {
            if now - last < self.config.read_interval() {
                return ReadOutcome::Cached;
            }
        }
        self.force_read(now)
    }

    /// Read the document regardless of the throttle.
    pub fn force_read(&mut self, now: DateTime<Utc>) -> ReadOutcome {
        self.last_read = Some(now);
        match self.store.load() {
            Ok(doc) => {
                self.read_alert.recover(now);
                self.malformed = false;
                self.merge(doc);
                ReadOutcome::Fresh
            }
            Err(e) => {
                self.malformed = matches!(e, BridgeError::Malformed(_));
                Metrics::store_failure(&S::OWNER.to_string(), "read");
                self.read_alert.fail(e.to_string(), now);
                ReadOutcome::Stale(e)
            }
        }
    }

    fn merge(&mut self, doc: SessionState) {
        let disk_own = S::from_state(&doc).clone();

        if !self.adopted {
            self.adopt(disk_own);
        } else if disk_own.seq() > self.local.seq() {
            warn!(
                actor = %S::OWNER,
                local_seq = self.local.seq(),
                disk_seq = disk_own.seq(),
                "Own section written by another process in the same role; adopting disk version"
            );
            self.local = disk_own.clone();
            self.persisted = Some(disk_own);
        }

        let mut shadow = doc;
        self.local.clone().install(&mut shadow);
        self.shadow = shadow;
    }

    /// Take the stored own section as the starting point, keeping anything
    /// decided before the store was readable.
    fn adopt(&mut self, disk_own: S) {
        let blank = SessionState::default();
        if self.local == *S::from_state(&blank) {
            debug!(actor = %S::OWNER, seq = disk_own.seq(), "Adopted own section from store");
            self.local = disk_own.clone();
        } else {
            warn!(
                actor = %S::OWNER,
                seq = disk_own.seq(),
                "Store readable again; folding decisions taken meanwhile into the stored section"
            );
            self.local.merge_offline(&disk_own);
        }
        self.persisted = Some(disk_own);
        self.adopted = true;
    }

    /// Record a new decision for the owned section and persist it if due.
    ///
    /// `urgent` bypasses the write throttle. The section's sequence number
    /// is managed by the bridge and ignored on input.
    pub fn publish(&mut self, mut section: S, now: DateTime<Utc>, urgent: bool) -> PublishOutcome {
        section.set_seq(self.local.seq());
        self.local = section;
        self.local.clone().install(&mut self.shadow);

        if !self.is_dirty() {
            return PublishOutcome::Unchanged;
        }
        if !self.adopted && !self.malformed {
            let e = BridgeError::NotAdopted(S::OWNER.to_string());
            self.write_alert.fail(e.to_string(), now);
            return PublishOutcome::Deferred;
        }
        if !urgent {
            if let Some(last) = self.last_write {
                if now - last < self.config.write_interval() {
                    return PublishOutcome::Deferred;
                }
            }
        }

        match self.write(now) {
            Ok(seq) => {
                self.write_alert.recover(now);
                PublishOutcome::Written(seq)
            }
            Err(e) => {
                Metrics::store_failure(&S::OWNER.to_string(), "write");
                self.write_alert.fail(e.to_string(), now);
                PublishOutcome::Failed(e)
            }
        }
    }

    /// Retry a pending write, if any.
    pub fn flush(&mut self, now: DateTime<Utc>) -> PublishOutcome {
        self.publish(self.local.clone(), now, true)
    }

    fn write(&mut self, now: DateTime<Utc>) -> BridgeResult<u64> {
        let _lock = self.store.lock()?;

        let mut base = match self.store.load() {
            Ok(doc) => {
                if !self.adopted {
                    self.adopt(S::from_state(&doc).clone());
                }
                doc
            }
            Err(BridgeError::Malformed(e)) => {
                warn!(actor = %S::OWNER, error = %e, "Malformed session document; rewriting from shadow");
                self.shadow.clone()
            }
            Err(e) => return Err(e),
        };

        let disk_seq = S::from_state(&base).seq();
        if disk_seq > self.local.seq() {
            warn!(
                actor = %S::OWNER,
                local_seq = self.local.seq(),
                disk_seq,
                "Lost update: overwriting own section written by another process"
            );
        }

        let mut candidate = self.local.clone();
        let seq = disk_seq.max(self.local.seq()) + 1;
        candidate.set_seq(seq);
        candidate.clone().install(&mut base);
        base.version = SCHEMA_VERSION;
        base.timestamp = Some(now);

        self.store.store(&base)?;

        self.local = candidate.clone();
        self.persisted = Some(candidate);
        self.adopted = true;
        self.malformed = false;
        self.last_write = Some(now);
        self.shadow = base;
        debug!(actor = %S::OWNER, seq, "Published session section");
        Ok(seq)
    }
}
