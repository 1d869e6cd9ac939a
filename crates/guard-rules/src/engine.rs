//! Rule engine.
//!
//! [`RuleEngine::evaluate`] is a pure function of the merged session
//! document and one [`Tick`] of live data. It returns a single [`Verdict`],
//! the positions to close, and the enforcer section to publish next.
//!
//! Evaluation order:
//! 1. Shutdown triggers (limits hit, already signalled, day ended)
//! 2. Consecutive-loss break trigger
//! 3. Outside trading hours
//! 4. Daily break window
//! 5. Loss break still running
//! 6. Cooldown (entries blocked, later positions closed)
//! 7. Strict mode vs. bias (additive)
//! 8. Checklist (additive)
//! 9. Session inactive / news lock / bias expired / trade slots
//!
//! Per-position safety (floating loss, lot size) and the profit lock are
//! applied on every evaluation regardless of the verdict.

use crate::config::{LossBreakPolicy, RulesConfig};
use crate::error::RulesResult;
use crate::schedule::{self, TradingCalendar};
use crate::verdict::{BlockReason, FlattenOrder, FlattenReason, ShutdownReason, Verdict};
use chrono::{DateTime, Duration, Utc};
use guard_core::{
    EnforcerSection, Position, PositionId, SessionState, TradeEvent, TradeEventKind, TradeResult,
    Usd,
};
use std::collections::HashSet;
use tracing::{error, info, warn};

/// Live inputs for one evaluation.
#[derive(Debug, Clone)]
pub struct Tick<'a> {
    pub now: DateTime<Utc>,
    pub positions: &'a [Position],
    pub checklist_complete: bool,
    /// High-impact news window observed locally, ORed with `news_lock`.
    pub news_window_active: bool,
    /// Positions opened after this instant are new entries. `None` on the
    /// first tick after start-up: nothing is new.
    pub previous_tick: Option<DateTime<Utc>>,
}

impl Tick<'_> {
    fn is_new(&self, position: &Position) -> bool {
        self.previous_tick
            .is_some_and(|prev| position.opened_at > prev)
    }
}

/// Output of one evaluation.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub flatten: Vec<FlattenOrder>,
    pub next: EnforcerSection,
}

/// Flatten list where the first reason recorded for a position wins.
#[derive(Default)]
struct FlattenList {
    orders: Vec<FlattenOrder>,
    seen: HashSet<PositionId>,
}

impl FlattenList {
    fn add(&mut self, position_id: PositionId, reason: FlattenReason) {
        if self.seen.insert(position_id) {
            self.orders.push(FlattenOrder {
                position_id,
                reason,
            });
        }
    }

    fn add_all(&mut self, positions: &[Position], reason: FlattenReason) {
        for p in positions {
            self.add(p.id, reason);
        }
    }
}

/// The trading-discipline rule engine.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    config: RulesConfig,
    calendar: Option<TradingCalendar>,
    /// Set when the configuration is invalid. A locked engine allows nothing.
    lock_reason: Option<String>,
}

impl RuleEngine {
    /// Build an engine from a validated configuration.
    pub fn new(config: RulesConfig) -> RulesResult<Self> {
        config.validate()?;
        let calendar = TradingCalendar::new(config.schedule.clone())?;
        Ok(Self {
            config,
            calendar: Some(calendar),
            lock_reason: None,
        })
    }

    /// Build an engine, falling back to a locked one if the configuration is
    /// invalid.
    pub fn fail_closed(config: RulesConfig) -> Self {
        match Self::new(config.clone()) {
            Ok(engine) => engine,
            Err(e) => {
                error!(error = %e, "Invalid rule configuration; enforcer locked");
                Self::locked(config, e.to_string())
            }
        }
    }

    pub fn locked(config: RulesConfig, reason: impl Into<String>) -> Self {
        let calendar = TradingCalendar::new(config.schedule.clone()).ok();
        Self {
            config,
            calendar,
            lock_reason: Some(reason.into()),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.lock_reason.is_some()
    }

    pub fn lock_reason(&self) -> Option<&str> {
        self.lock_reason.as_deref()
    }

    pub fn config(&self) -> &RulesConfig {
        &self.config
    }

    pub fn calendar(&self) -> Option<&TradingCalendar> {
        self.calendar.as_ref()
    }

    /// Apply the controller's reactions to the enforcer section: a newer
    /// epoch resets the day's counters, a fresh bias resets the bias loss
    /// count and expiry.
    pub fn reconcile(&self, state: &SessionState) -> EnforcerSection {
        let controller = &state.controller;
        let mut next = state.enforcer.clone();

        if controller.session_epoch > next.epoch {
            info!(
                from = next.epoch,
                to = controller.session_epoch,
                "New session epoch; resetting daily counters"
            );
            next = EnforcerSection::fresh(controller.session_epoch, next.enforcer_seq);
        }

        if controller.bias_set_at != next.bias_ref {
            info!(bias = %controller.bias, "Fresh bias recorded");
            next.bias_ref = controller.bias_set_at;
            next.losses_since_bias = 0;
            next.bias_expired = false;
        }

        next
    }

    /// Account a venue trade event into the enforcer section.
    pub fn on_trade_event(&self, section: &mut EnforcerSection, event: &TradeEvent) {
        let cooldown = &self.config.cooldown;
        match event.kind {
            TradeEventKind::Open => {
                schedule::on_open(section, event.opened_at, cooldown);
                info!(
                    position = %event.position_id,
                    symbol = %event.symbol,
                    direction = %event.direction,
                    volume = %event.volume,
                    "Trade opened"
                );
            }
            TradeEventKind::Close => {
                let pnl = event.net_pnl.unwrap_or(Usd::ZERO);
                let result = TradeResult::from_pnl(pnl);
                section.trades_today = section.trades_today.saturating_add(1);
                section.last_trade_result = result;
                section.last_trade_pnl = Some(pnl);

                if result == TradeResult::Loss {
                    section.daily_loss_usd += pnl.abs();
                    section.consecutive_losses = section.consecutive_losses.saturating_add(1);
                    section.losses_since_bias = section.losses_since_bias.saturating_add(1);
                    schedule::on_loss(section, event.at, cooldown);
                } else {
                    section.daily_profit_usd += pnl;
                    section.consecutive_losses = 0;
                }

                info!(
                    position = %event.position_id,
                    pnl = %pnl,
                    trades_today = section.trades_today,
                    consecutive_losses = section.consecutive_losses,
                    daily_loss = %section.daily_loss_usd,
                    daily_profit = %section.daily_profit_usd,
                    "Trade closed"
                );
            }
        }
    }

    /// Evaluate all rules for one tick.
    pub fn evaluate(&self, state: &SessionState, tick: &Tick<'_>) -> Evaluation {
        let now = tick.now;
        let mut next = self.reconcile(state);
        next.last_evaluated_at = Some(now);

        let Some(calendar) = self.calendar.as_ref().filter(|_| !self.is_locked()) else {
            return self.evaluate_locked(next, tick);
        };

        let controller = &state.controller;
        let limits = &self.config.limits;
        let mut flatten = FlattenList::default();

        if schedule::expire_break(&mut next, now) {
            info!("Loss break ended");
        }
        self.update_bias_expiry(state, &mut next, now);

        // Triggers.
        let shutdown = self.shutdown_trigger(state, &next);
        if let Some(reason) = shutdown {
            if reason != ShutdownReason::DayEnded && !next.shutdown_signal {
                warn!(
                    reason = %reason,
                    daily_loss = %next.daily_loss_usd,
                    daily_profit = %next.daily_profit_usd,
                    trades_today = next.trades_today,
                    "Daily shutdown triggered"
                );
                next.shutdown_signal = true;
                next.shutdown_reason = Some(reason.to_string());
            }
        }
        let break_trigger = match self.config.loss_break {
            LossBreakPolicy::Break { minutes }
                if shutdown.is_none()
                    && next.consecutive_losses >= limits.max_consecutive_losses =>
            {
                if !next.break_active {
                    warn!(
                        consecutive_losses = next.consecutive_losses,
                        minutes, "Loss break started"
                    );
                }
                schedule::start_break(&mut next, now, minutes);
                true
            }
            _ => false,
        };

        // Ordered rules.
        let mut verdict = if let Some(reason) = shutdown {
            flatten.add_all(tick.positions, FlattenReason::DayShutdown);
            Verdict::ShutdownDay(reason)
        } else if break_trigger {
            flatten.add_all(tick.positions, FlattenReason::LossBreak);
            Verdict::BreakForHour(next.consecutive_losses)
        } else if !calendar.within_trading_hours(now) {
            flatten.add_all(tick.positions, FlattenReason::OutsideHours);
            Verdict::Flatten(FlattenReason::OutsideHours)
        } else if calendar.in_daily_break(now) {
            flatten.add_all(tick.positions, FlattenReason::DailyBreak);
            Verdict::Flatten(FlattenReason::DailyBreak)
        } else if next.break_active {
            flatten.add_all(tick.positions, FlattenReason::LossBreak);
            Verdict::Flatten(FlattenReason::LossBreak)
        } else {
            self.entry_rules(state, &next, tick, &mut flatten)
        };

        // Per-position safety, every tick.
        for p in tick.positions {
            if p.floating_pnl <= -limits.max_loss_per_trade {
                flatten.add(p.id, FlattenReason::PerTradeLoss);
            } else if p.volume > limits.max_lot_size {
                flatten.add(p.id, FlattenReason::LotSize);
            }
        }

        // Profit lock.
        if !tick.positions.is_empty() {
            let floating: Usd = tick.positions.iter().map(|p| p.floating_pnl).sum();
            if next.realized_pnl() + floating >= limits.max_daily_profit {
                flatten.add_all(tick.positions, FlattenReason::ProfitLock);
                if matches!(verdict, Verdict::Allow | Verdict::BlockEntries(_)) {
                    verdict = Verdict::Flatten(FlattenReason::ProfitLock);
                }
            }
        }

        next.trading_allowed = controller.session_active
            && !controller.day_ended
            && !next.shutdown_signal
            && !next.break_active;

        Evaluation {
            verdict,
            flatten: flatten.orders,
            next,
        }
    }

    /// Rules 6 to 9, reached only when no flatten-all rule matched.
    fn entry_rules(
        &self,
        state: &SessionState,
        next: &EnforcerSection,
        tick: &Tick<'_>,
        flatten: &mut FlattenList,
    ) -> Verdict {
        let controller = &state.controller;
        let now = tick.now;
        let mut block = None;

        if next.active_cooldown(now).is_some() {
            if let Some(started) = next.cooldown_started_at {
                for p in tick.positions.iter().filter(|p| p.opened_at > started) {
                    flatten.add(p.id, FlattenReason::EntryBlocked(BlockReason::Cooldown));
                }
            }
            block = Some(BlockReason::Cooldown);
        }

        if controller.strict_mode && controller.bias.is_directional() && !next.bias_expired {
            for p in tick.positions.iter().filter(|p| p.direction.opposes(controller.bias)) {
                flatten.add(p.id, FlattenReason::OpposesBias);
            }
        }

        if self.config.checklist_enforced && !tick.checklist_complete {
            for p in tick.positions.iter().filter(|p| tick.is_new(p)) {
                flatten.add(p.id, FlattenReason::ChecklistIncomplete);
            }
        }

        if block.is_none() {
            block = if !controller.session_active {
                Some(BlockReason::SessionInactive)
            } else if controller.news_lock || tick.news_window_active {
                Some(BlockReason::NewsLock)
            } else if next.bias_expired {
                Some(BlockReason::BiasExpired)
            } else {
                None
            };
            if let Some(reason) = block {
                for p in tick.positions.iter().filter(|p| tick.is_new(p)) {
                    flatten.add(p.id, FlattenReason::EntryBlocked(reason));
                }
            }
        }

        // Trade slots: completed trades plus positions already held.
        let max = self.config.limits.max_trades_per_day;
        let (mut fresh, held): (Vec<&Position>, Vec<&Position>) =
            tick.positions.iter().partition(|p| tick.is_new(p));
        let used = next.trades_today.saturating_add(held.len() as u32);
        let slots = max.saturating_sub(used) as usize;
        fresh.sort_by_key(|p| p.opened_at);
        for p in fresh.iter().skip(slots) {
            flatten.add(p.id, FlattenReason::EntryBlocked(BlockReason::TradeLimit));
        }

        match block {
            Some(reason) => Verdict::BlockEntries(reason),
            None if used.saturating_add(fresh.len().min(slots) as u32) >= max => {
                Verdict::BlockEntries(BlockReason::TradeLimit)
            }
            None => Verdict::Allow,
        }
    }

    fn shutdown_trigger(&self, state: &SessionState, next: &EnforcerSection) -> Option<ShutdownReason> {
        let limits = &self.config.limits;
        if next.daily_loss_usd >= limits.max_daily_loss {
            Some(ShutdownReason::DailyLoss)
        } else if next.daily_profit_usd >= limits.max_daily_profit {
            Some(ShutdownReason::DailyProfit)
        } else if next.trades_today >= limits.max_trades_per_day {
            Some(ShutdownReason::TradeLimit)
        } else if self.config.loss_break == LossBreakPolicy::EndDay
            && next.consecutive_losses >= limits.max_consecutive_losses
        {
            Some(ShutdownReason::ConsecutiveLosses)
        } else if next.shutdown_signal || state.controller.day_ended {
            Some(ShutdownReason::DayEnded)
        } else {
            None
        }
    }

    fn update_bias_expiry(&self, state: &SessionState, next: &mut EnforcerSection, now: DateTime<Utc>) {
        let Some(set_at) = state.controller.bias_set_at else {
            return;
        };
        if next.bias_expired {
            return;
        }
        let policy = &self.config.bias;
        let aged = now - set_at > Duration::minutes(i64::from(policy.expiry_minutes));
        let worn = next.losses_since_bias >= policy.max_losses;
        if aged || worn {
            info!(
                losses_since_bias = next.losses_since_bias,
                aged, "Bias expired; entries blocked until a fresh bias"
            );
            next.bias_expired = true;
        }
    }

    fn evaluate_locked(&self, mut next: EnforcerSection, tick: &Tick<'_>) -> Evaluation {
        let mut flatten = FlattenList::default();
        for p in tick.positions.iter().filter(|p| tick.is_new(p)) {
            flatten.add(p.id, FlattenReason::EntryBlocked(BlockReason::ConfigLocked));
        }
        next.trading_allowed = false;
        Evaluation {
            verdict: Verdict::BlockEntries(BlockReason::ConfigLocked),
            flatten: flatten.orders,
            next,
        }
    }
}
