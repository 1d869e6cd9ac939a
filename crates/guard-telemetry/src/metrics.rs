//! Prometheus metrics for the trading guard.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, a programming error that should crash at
//! startup. These panics only occur during static initialization.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_int_gauge, CounterVec, GaugeVec, IntGauge,
};

/// Rule engine verdicts.
/// Labels: verdict (allow/block_entries/flatten/shutdown_day/break)
pub static VERDICT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "guard_verdict_total",
        "Rule engine verdicts by kind",
        &["verdict"]
    )
    .unwrap()
});

/// Close requests sent to the venue.
pub static FLATTEN_ATTEMPT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "guard_flatten_attempt_total",
        "Force-close attempts by reason",
        &["reason"]
    )
    .unwrap()
});

/// Close requests that failed after all retries.
pub static FLATTEN_FAILED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "guard_flatten_failed_total",
        "Force-close requests that exhausted retries",
        &["reason"]
    )
    .unwrap()
});

/// Session store I/O failures.
/// Labels: actor, op (read/write)
pub static STORE_FAILURE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "guard_store_failure_total",
        "Session store read/write failures",
        &["actor", "op"]
    )
    .unwrap()
});

/// Closed trades by result.
pub static TRADE_CLOSED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "guard_trade_closed_total",
        "Closed trades by result",
        &["result"]
    )
    .unwrap()
});

/// Realized daily counters as last published.
/// Labels: counter (loss/profit)
pub static DAILY_USD: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "guard_daily_usd",
        "Realized daily loss/profit in USD",
        &["counter"]
    )
    .unwrap()
});

/// Number of operator alerts currently firing.
pub static ACTIVE_ALERTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("guard_active_alerts", "Operator alerts currently firing").unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record a verdict.
    pub fn verdict(kind: &str) {
        VERDICT_TOTAL.with_label_values(&[kind]).inc();
    }

    /// Record a force-close attempt.
    pub fn flatten_attempt(reason: &str) {
        FLATTEN_ATTEMPT_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record a force-close that exhausted retries.
    pub fn flatten_failed(reason: &str) {
        FLATTEN_FAILED_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record a session store failure.
    pub fn store_failure(actor: &str, op: &str) {
        STORE_FAILURE_TOTAL.with_label_values(&[actor, op]).inc();
    }

    /// Record a closed trade.
    pub fn trade_closed(result: &str) {
        TRADE_CLOSED_TOTAL.with_label_values(&[result]).inc();
    }

    /// Publish realized daily counters.
    pub fn daily_usd(loss: f64, profit: f64) {
        DAILY_USD.with_label_values(&["loss"]).set(loss);
        DAILY_USD.with_label_values(&["profit"]).set(profit);
    }

    pub fn alert_raised() {
        ACTIVE_ALERTS.inc();
    }

    pub fn alert_cleared() {
        ACTIVE_ALERTS.dec();
    }
}
