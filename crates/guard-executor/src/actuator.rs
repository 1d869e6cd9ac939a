//! Enforcement actuator.
//!
//! Executes flatten orders against the venue. Closing is idempotent: a
//! position the venue no longer knows counts as closed. Transient venue
//! errors are retried a bounded number of times with a linear backoff;
//! anything still open afterwards is reported, and the next evaluation
//! will order it closed again.

use crate::error::{ExecutorError, ExecutorResult, VenueError};
use crate::venue::ExecutionVenue;
use guard_core::PositionId;
use guard_rules::FlattenOrder;
use guard_telemetry::Metrics;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    /// Close attempts per position per evaluation.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff after the first failed attempt; grows linearly.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    200
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// How a single close ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    /// The venue no longer had it.
    AlreadyClosed,
}

/// Result of closing a batch of positions. Partial failure is normal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseReport {
    pub closed: Vec<PositionId>,
    pub already_closed: Vec<PositionId>,
    pub failed: Vec<(PositionId, String)>,
}

impl CloseReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.closed.len() + self.already_closed.len() + self.failed.len()
    }

    fn record(&mut self, position: PositionId, result: ExecutorResult<CloseOutcome>) {
        match result {
            Ok(CloseOutcome::Closed) => self.closed.push(position),
            Ok(CloseOutcome::AlreadyClosed) => self.already_closed.push(position),
            Err(e) => self.failed.push((position, e.to_string())),
        }
    }
}

/// Closes positions on a venue.
pub struct EnforcementActuator<V: ExecutionVenue> {
    venue: V,
    config: ActuatorConfig,
}

impl<V: ExecutionVenue> EnforcementActuator<V> {
    pub fn new(venue: V, config: ActuatorConfig) -> Self {
        Self { venue, config }
    }

    pub fn venue(&self) -> &V {
        &self.venue
    }

    /// Close one position, retrying transient failures.
    pub async fn force_close(&self, position: PositionId) -> ExecutorResult<CloseOutcome> {
        let attempts = self.config.max_attempts.max(1);
        let mut last = String::new();

        for attempt in 1..=attempts {
            match self.venue.submit_close(position).await {
                Ok(()) => {
                    info!(position = %position, attempt, "Position closed");
                    return Ok(CloseOutcome::Closed);
                }
                Err(VenueError::NotFound(_)) => {
                    return Ok(CloseOutcome::AlreadyClosed);
                }
                Err(VenueError::Rejected(reason)) => {
                    return Err(ExecutorError::CloseFailed {
                        position,
                        attempts: attempt,
                        reason,
                    });
                }
                Err(VenueError::Transient(reason)) => {
                    warn!(position = %position, attempt, reason = %reason, "Close attempt failed");
                    last = reason;
                    if attempt < attempts {
                        let backoff = self.config.backoff_ms * u64::from(attempt);
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                    }
                }
            }
        }

        Err(ExecutorError::CloseFailed {
            position,
            attempts,
            reason: last,
        })
    }

    /// Close every open position the venue reports.
    pub async fn close_all(&self) -> ExecutorResult<CloseReport> {
        let positions = self.venue.list_open_positions().await?;
        let mut report = CloseReport::default();
        for p in positions {
            let result = self.force_close(p.id).await;
            report.record(p.id, result);
        }
        Ok(report)
    }

    /// Execute flatten orders from one evaluation. Each position is closed
    /// at most once per call.
    pub async fn execute(&self, orders: &[FlattenOrder]) -> CloseReport {
        let mut report = CloseReport::default();
        let mut seen = HashSet::new();

        for order in orders {
            if !seen.insert(order.position_id) {
                continue;
            }
            let label = order.reason.label();
            Metrics::flatten_attempt(label);
            info!(position = %order.position_id, reason = %order.reason, "Flattening position");

            let result = self.force_close(order.position_id).await;
            if let Err(e) = &result {
                Metrics::flatten_failed(label);
                warn!(position = %order.position_id, error = %e, "Could not enforce flatten");
            }
            report.record(order.position_id, result);
        }
        report
    }
}
