//! The shared session document.
//!
//! Both actors read and write one JSON document. Every field has exactly one
//! writer role, expressed by splitting the document into a
//! [`ControllerSection`] and an [`EnforcerSection`] that are flattened into
//! the same JSON object. An actor only ever publishes its own section; the
//! other section is read-only to it.

use crate::decimal::Usd;
use crate::types::{Bias, TradeResult};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current schema version of the session document.
pub const SCHEMA_VERSION: u32 = 2;

/// Writer role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    Controller,
    Enforcer,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Controller => write!(f, "controller"),
            Self::Enforcer => write!(f, "enforcer"),
        }
    }
}

/// Fields written only by the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSection {
    /// Operator started a session and it has not been ended.
    pub session_active: bool,
    /// The trading day is over (manual end, auto-shutdown, or recovery-day veto).
    pub day_ended: bool,
    /// Local trading day the current epoch belongs to.
    pub trading_day: Option<NaiveDate>,
    /// Incremented at every day rollover; the enforcer resets its counters
    /// when it observes a newer epoch.
    pub session_epoch: u64,
    pub bias: Bias,
    pub invalidation_price: Option<Decimal>,
    pub strict_mode: bool,
    pub bias_set_at: Option<DateTime<Utc>>,
    /// Manual lock OR the news calendar's high-impact window.
    pub news_lock: bool,
    pub checklist_complete: bool,
    pub controller_seq: u64,
}

/// Fields written only by the enforcer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcerSection {
    /// Controller epoch these counters belong to.
    pub epoch: u64,
    pub trading_allowed: bool,
    pub shutdown_signal: bool,
    pub shutdown_reason: Option<String>,
    pub break_active: bool,
    pub break_until: Option<DateTime<Utc>>,
    pub daily_loss_usd: Usd,
    pub daily_profit_usd: Usd,
    /// Completed trades this day.
    pub trades_today: u32,
    pub consecutive_losses: u32,
    pub losses_since_bias: u32,
    /// The controller's `bias_set_at` that `losses_since_bias` counts against.
    pub bias_ref: Option<DateTime<Utc>>,
    pub bias_expired: bool,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub cooldown_started_at: Option<DateTime<Utc>>,
    pub last_trade_result: TradeResult,
    pub last_trade_pnl: Option<Usd>,
    /// Enforcer heartbeat.
    pub last_evaluated_at: Option<DateTime<Utc>>,
    pub enforcer_seq: u64,
}

impl EnforcerSection {
    /// Counters for a new epoch. Carries only the sequence number forward.
    pub fn fresh(epoch: u64, seq: u64) -> Self {
        Self {
            epoch,
            enforcer_seq: seq,
            ..Self::default()
        }
    }

    /// Realized net P&L for the day.
    pub fn realized_pnl(&self) -> Usd {
        self.daily_profit_usd - self.daily_loss_usd
    }

    /// Cooldown deadline, if one is set and still in the future.
    pub fn active_cooldown(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.cooldown_until.filter(|until| *until > now)
    }
}

/// The whole shared document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub version: u32,
    #[serde(flatten)]
    pub controller: ControllerSection,
    #[serde(flatten)]
    pub enforcer: EnforcerSection,
    /// Last writer's wall clock. Operator visibility only.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            controller: ControllerSection::default(),
            enforcer: EnforcerSection::default(),
            timestamp: None,
        }
    }
}

impl SessionState {
    /// Section owned by `S`.
    pub fn section<S: OwnedSection>(&self) -> &S {
        S::from_state(self)
    }
}

/// A section of the session document with a single writer role.
pub trait OwnedSection: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// The role allowed to write this section.
    const OWNER: Actor;

    /// Borrow this section out of a document.
    fn from_state(state: &SessionState) -> &Self;

    /// Replace this section inside a document, leaving the other untouched.
    fn install(self, state: &mut SessionState);

    /// Per-writer sequence number.
    fn seq(&self) -> u64;

    fn set_seq(&mut self, seq: u64);

    /// Fold decisions taken before the store was first readable into the
    /// section found on disk.
    ///
    /// `self` started from defaults, so its counters are increments on top
    /// of `disk`. The result carries `disk`'s sequence number.
    fn merge_offline(&mut self, disk: &Self);
}

fn later<T: Ord + Copy>(a: Option<T>, b: Option<T>) -> Option<T> {
    a.max(b)
}

impl OwnedSection for ControllerSection {
    const OWNER: Actor = Actor::Controller;

    fn from_state(state: &SessionState) -> &Self {
        &state.controller
    }

    fn install(self, state: &mut SessionState) {
        state.controller = self;
    }

    fn seq(&self) -> u64 {
        self.controller_seq
    }

    fn set_seq(&mut self, seq: u64) {
        self.controller_seq = seq;
    }

    fn merge_offline(&mut self, disk: &Self) {
        let mut merged = disk.clone();
        if self.bias_set_at > disk.bias_set_at {
            merged.bias = self.bias;
            merged.invalidation_price = self.invalidation_price;
            merged.strict_mode = self.strict_mode;
            merged.bias_set_at = self.bias_set_at;
        }
        merged.news_lock = self.news_lock;
        merged.checklist_complete = self.checklist_complete || disk.checklist_complete;
        *self = merged;
    }
}

impl OwnedSection for EnforcerSection {
    const OWNER: Actor = Actor::Enforcer;

    fn from_state(state: &SessionState) -> &Self {
        &state.enforcer
    }

    fn install(self, state: &mut SessionState) {
        state.enforcer = self;
    }

    fn seq(&self) -> u64 {
        self.enforcer_seq
    }

    fn set_seq(&mut self, seq: u64) {
        self.enforcer_seq = seq;
    }

    fn merge_offline(&mut self, disk: &Self) {
        if self.epoch > disk.epoch {
            // The disk counters belong to an earlier day.
            self.enforcer_seq = disk.enforcer_seq;
            return;
        }
        let local = self.clone();
        let mut merged = disk.clone();

        merged.daily_loss_usd = disk.daily_loss_usd + local.daily_loss_usd;
        merged.daily_profit_usd = disk.daily_profit_usd + local.daily_profit_usd;
        merged.trades_today = disk.trades_today + local.trades_today;
        // A streak that covers every local close continues the one on disk.
        let streak_broken = local.consecutive_losses < local.trades_today;
        merged.consecutive_losses = if streak_broken {
            local.consecutive_losses
        } else {
            disk.consecutive_losses + local.consecutive_losses
        };

        if local.bias_ref == disk.bias_ref {
            merged.losses_since_bias = disk.losses_since_bias + local.losses_since_bias;
            merged.bias_expired = disk.bias_expired || local.bias_expired;
        } else if local.bias_ref > disk.bias_ref {
            merged.bias_ref = local.bias_ref;
            merged.losses_since_bias = local.losses_since_bias;
            merged.bias_expired = local.bias_expired;
        }

        if local.cooldown_until > disk.cooldown_until {
            merged.cooldown_until = local.cooldown_until;
            merged.cooldown_started_at = local.cooldown_started_at;
        }
        merged.break_until = later(local.break_until, disk.break_until);
        merged.break_active = local.break_active || disk.break_active;
        merged.shutdown_signal = local.shutdown_signal || disk.shutdown_signal;
        merged.shutdown_reason = local.shutdown_reason.or(disk.shutdown_reason.clone());
        merged.trading_allowed = local.trading_allowed && disk.trading_allowed;

        if local.last_trade_pnl.is_some() {
            merged.last_trade_result = local.last_trade_result;
            merged.last_trade_pnl = local.last_trade_pnl;
        }
        merged.last_evaluated_at = later(local.last_evaluated_at, disk.last_evaluated_at);
        *self = merged;
    }
}
