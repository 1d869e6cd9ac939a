//! Repeating operator alerts.
//!
//! An alert is raised by a condition that leaves the operator exposed
//! (store unreachable, a losing position that cannot be closed). While the
//! condition holds, every tick logs at ERROR level with the failure count
//! and how long it has persisted. Clearing logs once at INFO.

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::metrics::Metrics;

/// A named, repeating operator alert.
#[derive(Debug)]
pub struct OperatorAlert {
    name: &'static str,
    /// Consecutive failures before the alert starts firing.
    threshold: u32,
    failures: u32,
    since: Option<DateTime<Utc>>,
    firing: bool,
    last_detail: Option<String>,
}

impl OperatorAlert {
    #[must_use]
    pub fn new(name: &'static str, threshold: u32) -> Self {
        Self {
            name,
            threshold: threshold.max(1),
            failures: 0,
            since: None,
            firing: false,
            last_detail: None,
        }
    }

    /// Record one failed attempt. Fires (and repeats) once the threshold is met.
    pub fn fail(&mut self, detail: impl Into<String>, now: DateTime<Utc>) {
        self.failures = self.failures.saturating_add(1);
        let since = *self.since.get_or_insert(now);
        let detail = detail.into();

        if self.failures >= self.threshold {
            if !self.firing {
                self.firing = true;
                Metrics::alert_raised();
            }
            let persisted_secs = (now - since).num_seconds();
            error!(
                alert = self.name,
                failures = self.failures,
                persisted_secs,
                detail = %detail,
                "OPERATOR ALERT: {}",
                self.name
            );
        }
        self.last_detail = Some(detail);
    }

    /// Record a success. Clears the alert if it was firing.
    pub fn recover(&mut self, now: DateTime<Utc>) {
        if self.firing {
            let persisted_secs = self.since.map(|s| (now - s).num_seconds()).unwrap_or(0);
            info!(
                alert = self.name,
                failures = self.failures,
                persisted_secs,
                "Operator alert cleared"
            );
            Metrics::alert_cleared();
        }
        self.failures = 0;
        self.since = None;
        self.firing = false;
        self.last_detail = None;
    }

    #[must_use]
    pub fn is_firing(&self) -> bool {
        self.firing
    }

    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    #[must_use]
    pub fn last_detail(&self) -> Option<&str> {
        self.last_detail.as_deref()
    }
}
