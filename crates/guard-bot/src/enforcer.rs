//! Enforcer loop.
//!
//! Runs next to the execution venue. Every tick it reads the session
//! document, accounts the venue's trade events, evaluates the rules against
//! live positions, closes what must be closed, and publishes the enforcer
//! section. Safety checks always use the positions fetched this tick, never
//! the synced snapshot.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::news::NewsCalendar;
use chrono::{DateTime, Utc};
use guard_bridge::{PublishOutcome, ReadOutcome, SessionBridge, SessionStore};
use guard_core::{EnforcerSection, Position, PositionId, TradeEventKind, TradeResult};
use guard_executor::{CloseReport, EnforcementActuator, ExecutionVenue};
use guard_persistence::TradeJournal;
use guard_rules::{Evaluation, FlattenOrder, FlattenReason, RuleEngine, Tick, Verdict};
use guard_telemetry::{Metrics, OperatorAlert};
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Consecutive venue failures before the operator alert fires.
const VENUE_ALERT_THRESHOLD: u32 = 3;

/// What one tick did.
#[derive(Debug)]
pub struct TickReport {
    pub verdict: Verdict,
    pub closes: CloseReport,
    pub publish: PublishOutcome,
}

/// The enforcer actor.
pub struct Enforcer<St: SessionStore, V: ExecutionVenue, J: TradeJournal, N: NewsCalendar> {
    bridge: SessionBridge<EnforcerSection, St>,
    engine: RuleEngine,
    actuator: EnforcementActuator<V>,
    journal: J,
    news: N,
    previous_tick: Option<DateTime<Utc>>,
    last_verdict: Option<Verdict>,
    /// Flatten orders whose close failed; re-issued while the position is open.
    pending: HashMap<PositionId, FlattenReason>,
    venue_alert: OperatorAlert,
    close_alert: OperatorAlert,
    poll_interval: std::time::Duration,
}

impl<St, V, J, N> Enforcer<St, V, J, N>
where
    St: SessionStore,
    V: ExecutionVenue,
    J: TradeJournal,
    N: NewsCalendar,
{
    /// Build the enforcer. An invalid rule configuration does not prevent
    /// start-up: the engine runs locked and allows nothing.
    pub fn new(
        config: &AppConfig,
        store: St,
        venue: V,
        journal: J,
        news: N,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            bridge: SessionBridge::open(store, config.bridge.clone(), now),
            engine: RuleEngine::fail_closed(config.rules.clone()),
            actuator: EnforcementActuator::new(venue, config.actuator.clone()),
            journal,
            news,
            previous_tick: None,
            last_verdict: None,
            pending: HashMap::new(),
            venue_alert: OperatorAlert::new("venue_unreachable", VENUE_ALERT_THRESHOLD),
            close_alert: OperatorAlert::new("flatten_failed", 1),
            poll_interval: std::time::Duration::from_millis(config.enforcer.poll_interval_ms),
        }
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    pub fn venue(&self) -> &V {
        self.actuator.venue()
    }

    /// Enforcer section as last decided.
    pub fn section(&self) -> &EnforcerSection {
        self.bridge.local()
    }

    pub fn last_verdict(&self) -> Option<&Verdict> {
        self.last_verdict.as_ref()
    }

    /// One polling cycle.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> AppResult<TickReport> {
        if let ReadOutcome::Stale(e) = self.bridge.read(now) {
            warn!(error = %e, "Session store read failed; evaluating on last-known state");
        }

        let positions = match self.actuator.venue().list_open_positions().await {
            Ok(positions) => {
                self.venue_alert.recover(now);
                positions
            }
            Err(e) => {
                self.venue_alert.fail(e.to_string(), now);
                self.block_entries(now);
                return Err(e.into());
            }
        };

        let mut state = self.bridge.view().clone();
        let mut section = self.engine.reconcile(&state);
        self.account_events(&mut section, now).await;
        state.enforcer = section;

        let tick = Tick {
            now,
            positions: &positions,
            checklist_complete: state.controller.checklist_complete,
            news_window_active: self.news.is_high_impact_window_active(now),
            previous_tick: self.previous_tick,
        };
        let Evaluation {
            verdict,
            flatten,
            next,
        } = self.engine.evaluate(&state, &tick);

        Metrics::verdict(verdict.label());
        if self.last_verdict.as_ref() != Some(&verdict) {
            if verdict.allows_entries() {
                info!(%verdict, "Verdict changed");
            } else {
                warn!(%verdict, positions = positions.len(), "Verdict changed");
            }
        }

        let orders = self.with_pending(flatten, &positions);
        let closes = self.actuator.execute(&orders).await;
        self.track_failures(&orders, &closes, now);

        let urgent = significant_change(self.bridge.local(), &next);
        Metrics::daily_usd(
            next.daily_loss_usd.inner().to_f64().unwrap_or_default(),
            next.daily_profit_usd.inner().to_f64().unwrap_or_default(),
        );
        let publish = self.bridge.publish(next, now, urgent);
        match &publish {
            PublishOutcome::Written(seq) => debug!(seq, urgent, "Enforcer section written"),
            PublishOutcome::Failed(e) => {
                warn!(error = %e, "Enforcer section not persisted; retrying next tick")
            }
            PublishOutcome::Deferred | PublishOutcome::Unchanged => {}
        }

        self.previous_tick = Some(now);
        self.last_verdict = Some(verdict.clone());
        Ok(TickReport {
            verdict,
            closes,
            publish,
        })
    }

    /// Run until Ctrl+C.
    pub async fn run(&mut self) -> AppResult<()> {
        let mut interval = tokio::time::interval(self.poll_interval);
        info!(
            poll_ms = self.poll_interval.as_millis() as u64,
            locked = self.engine.is_locked(),
            "Enforcer running"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        warn!(error = %e, "Enforcer tick failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down enforcer");
                    break;
                }
            }
        }

        if let PublishOutcome::Failed(e) = self.bridge.flush(Utc::now()) {
            warn!(error = %e, "Final enforcer flush failed");
        }
        Ok(())
    }

    async fn account_events(&mut self, section: &mut EnforcerSection, now: DateTime<Utc>) {
        let events = match self.actuator.venue().poll_trade_events().await {
            Ok(events) => events,
            Err(e) => {
                self.venue_alert.fail(e.to_string(), now);
                return;
            }
        };
        for event in &events {
            self.engine.on_trade_event(section, event);
            if event.kind == TradeEventKind::Close {
                Metrics::trade_closed(match section.last_trade_result {
                    TradeResult::Loss => "loss",
                    _ => "win",
                });
            }
            if let Err(e) = self.journal.record(event) {
                warn!(error = %e, position = %event.position_id, "Trade journal write failed");
            }
        }
    }

    /// The venue could not be read: publish that entries are not allowed.
    fn block_entries(&mut self, now: DateTime<Utc>) {
        let mut section = self.bridge.local().clone();
        if section.trading_allowed {
            section.trading_allowed = false;
            warn!("Venue unreachable; trading not allowed until positions can be read");
            self.bridge.publish(section, now, true);
        }
    }

    /// Append failed orders from earlier ticks for positions still open.
    fn with_pending(&mut self, mut orders: Vec<FlattenOrder>, positions: &[Position]) -> Vec<FlattenOrder> {
        self.pending
            .retain(|id, _| positions.iter().any(|p| p.id == *id));
        for (&position_id, &reason) in &self.pending {
            if !orders.iter().any(|o| o.position_id == position_id) {
                orders.push(FlattenOrder {
                    position_id,
                    reason,
                });
            }
        }
        orders
    }

    fn track_failures(&mut self, orders: &[FlattenOrder], closes: &CloseReport, now: DateTime<Utc>) {
        for id in closes.closed.iter().chain(&closes.already_closed) {
            self.pending.remove(id);
        }
        for (id, _) in &closes.failed {
            if let Some(order) = orders.iter().find(|o| o.position_id == *id) {
                self.pending.insert(*id, order.reason);
            }
        }

        if closes.failed.is_empty() {
            self.close_alert.recover(now);
        } else {
            let detail = closes
                .failed
                .iter()
                .map(|(id, reason)| format!("{id}: {reason}"))
                .collect::<Vec<_>>()
                .join(", ");
            self.close_alert.fail(detail, now);
        }
    }
}

/// Anything other than the heartbeat changed.
fn significant_change(current: &EnforcerSection, next: &EnforcerSection) -> bool {
    let mut a = current.clone();
    let mut b = next.clone();
    a.last_evaluated_at = None;
    b.last_evaluated_at = None;
    a.enforcer_seq = 0;
    b.enforcer_seq = 0;
    a != b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::news::MockNewsCalendar;
    use chrono::{Duration, TimeZone};
    use guard_bridge::{BridgeConfig, FileSessionStore, StoreConfig};
    use guard_core::{ControllerSection, Direction, Lots, TradeEvent, Usd};
    use guard_executor::PaperVenue;
    use guard_persistence::PersistenceResult;
    use guard_rules::{BlockReason, ShutdownReason};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Default)]
    struct VecJournal {
        events: Vec<TradeEvent>,
    }

    impl TradeJournal for VecJournal {
        fn record(&mut self, event: &TradeEvent) -> PersistenceResult<()> {
            self.events.push(event.clone());
            Ok(())
        }
    }

    type TestEnforcer = Enforcer<FileSessionStore, Arc<PaperVenue>, VecJournal, MockNewsCalendar>;

    /// 12:30 Tehran.
    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn config(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.store = StoreConfig::at(dir.path().join("session.json"));
        config.bridge = BridgeConfig {
            read_interval_ms: 0,
            write_interval_ms: 0,
        };
        config.actuator.backoff_ms = 0;
        config
    }

    fn activate(dir: &TempDir, edit: impl FnOnce(&mut ControllerSection)) {
        let config = config(dir);
        let mut bridge: SessionBridge<ControllerSection, _> =
            SessionBridge::open(FileSessionStore::new(config.store.clone()), config.bridge, t0());
        let mut section = bridge.local().clone();
        section.session_active = true;
        section.session_epoch = 1;
        edit(&mut section);
        bridge.publish(section, t0(), true);
    }

    fn enforcer(dir: &TempDir, venue: Arc<PaperVenue>) -> TestEnforcer {
        let config = config(dir);
        let mut news = MockNewsCalendar::new();
        news.expect_is_high_impact_window_active().return_const(false);
        Enforcer::new(
            &config,
            FileSessionStore::new(config.store.clone()),
            venue,
            VecJournal::default(),
            news,
            t0(),
        )
    }

    #[tokio::test]
    async fn test_allow_publishes_trading_allowed() {
        let dir = TempDir::new().unwrap();
        activate(&dir, |_| {});
        let venue = Arc::new(PaperVenue::new());
        let mut enforcer = enforcer(&dir, venue);

        let report = enforcer.tick(t0()).await.unwrap();
        assert_eq!(report.verdict, Verdict::Allow);
        assert!(matches!(report.publish, PublishOutcome::Written(_)));
        assert!(enforcer.section().trading_allowed);
        assert_eq!(enforcer.section().epoch, 1);
        assert_eq!(enforcer.section().last_evaluated_at, Some(t0()));
    }

    #[tokio::test]
    async fn test_losing_close_starts_cooldown_and_is_journaled() {
        let dir = TempDir::new().unwrap();
        activate(&dir, |_| {});
        let venue = Arc::new(PaperVenue::new());
        let mut enforcer = enforcer(&dir, venue.clone());
        enforcer.tick(t0()).await.unwrap();

        let opened_at = t0() + Duration::seconds(1);
        let p = venue.open("XAUUSD", Direction::Buy, Lots::new(dec!(0.1)), opened_at);
        venue.set_floating(p.id, Usd::new(dec!(-5)));
        venue.set_clock(t0() + Duration::minutes(1));
        venue.submit_close(p.id).await.unwrap();

        let report = enforcer.tick(t0() + Duration::minutes(1)).await.unwrap();
        assert_eq!(report.verdict, Verdict::BlockEntries(BlockReason::Cooldown));
        let section = enforcer.section();
        assert_eq!(section.trades_today, 1);
        assert_eq!(section.daily_loss_usd, Usd::new(dec!(5)));
        // Base 15 from the open, then +10 on the loss.
        assert_eq!(section.cooldown_until, Some(opened_at + Duration::minutes(25)));
        assert_eq!(enforcer.journal.events.len(), 2);
    }

    #[tokio::test]
    async fn test_per_trade_loss_flattened_from_live_data() {
        let dir = TempDir::new().unwrap();
        activate(&dir, |_| {});
        let venue = Arc::new(PaperVenue::new());
        let mut enforcer = enforcer(&dir, venue.clone());

        let p = venue.open("XAUUSD", Direction::Sell, Lots::new(dec!(0.2)), t0() - Duration::minutes(30));
        enforcer.tick(t0()).await.unwrap();
        assert!(venue.is_open(p.id));

        venue.set_floating(p.id, Usd::new(dec!(-12)));
        let report = enforcer.tick(t0() + Duration::seconds(2)).await.unwrap();
        assert_eq!(report.closes.closed, vec![p.id]);
        assert!(!venue.is_open(p.id));
    }

    #[tokio::test]
    async fn test_failed_close_is_retried_next_tick() {
        let dir = TempDir::new().unwrap();
        activate(&dir, |c| {
            c.bias = guard_core::Bias::Bullish;
            c.strict_mode = true;
            c.bias_set_at = Some(t0());
        });
        let venue = Arc::new(PaperVenue::new());
        let mut enforcer = enforcer(&dir, venue.clone());
        enforcer.tick(t0()).await.unwrap();

        let p = venue.open("EURUSD", Direction::Sell, Lots::new(dec!(0.1)), t0() + Duration::seconds(1));
        // One more failure than the actuator retries.
        venue.fail_closes(p.id, 4);
        let report = enforcer.tick(t0() + Duration::seconds(2)).await.unwrap();
        assert_eq!(report.closes.failed.len(), 1);
        assert!(enforcer.close_alert.is_firing());

        let report = enforcer.tick(t0() + Duration::seconds(4)).await.unwrap();
        assert_eq!(report.closes.closed, vec![p.id]);
        assert!(!enforcer.close_alert.is_firing());
    }

    #[tokio::test]
    async fn test_daily_loss_limit_signals_shutdown() {
        let dir = TempDir::new().unwrap();
        activate(&dir, |_| {});
        let venue = Arc::new(PaperVenue::new());
        let mut enforcer = enforcer(&dir, venue.clone());
        enforcer.tick(t0()).await.unwrap();

        for (i, loss) in [dec!(-11), dec!(-13)].into_iter().enumerate() {
            let at = t0() + Duration::minutes(i as i64 * 40);
            let p = venue.open("XAUUSD", Direction::Buy, Lots::new(dec!(0.1)), at);
            venue.set_floating(p.id, Usd::new(loss));
            venue.set_clock(at + Duration::minutes(5));
            venue.submit_close(p.id).await.unwrap();
        }

        let report = enforcer.tick(t0() + Duration::minutes(50)).await.unwrap();
        assert_eq!(report.verdict, Verdict::ShutdownDay(ShutdownReason::DailyLoss));
        let section = enforcer.section();
        assert!(section.shutdown_signal);
        assert!(!section.trading_allowed);
        assert_eq!(section.shutdown_reason.as_deref(), Some("daily loss limit"));
    }

    #[tokio::test]
    async fn test_invalid_config_runs_locked() {
        let dir = TempDir::new().unwrap();
        activate(&dir, |_| {});
        let mut config = config(&dir);
        config.rules.limits.max_trades_per_day = 0;
        let mut news = MockNewsCalendar::new();
        news.expect_is_high_impact_window_active().return_const(false);
        let venue = Arc::new(PaperVenue::new());
        let mut enforcer: TestEnforcer = Enforcer::new(
            &config,
            FileSessionStore::new(config.store.clone()),
            venue.clone(),
            VecJournal::default(),
            news,
            t0(),
        );
        assert!(enforcer.engine().is_locked());

        enforcer.tick(t0()).await.unwrap();
        let p = venue.open("XAUUSD", Direction::Buy, Lots::new(dec!(0.1)), t0() + Duration::seconds(1));
        let report = enforcer.tick(t0() + Duration::seconds(2)).await.unwrap();
        assert_eq!(report.verdict, Verdict::BlockEntries(BlockReason::ConfigLocked));
        assert!(!venue.is_open(p.id));
        assert!(!enforcer.section().trading_allowed);
    }

    #[test]
    fn test_heartbeat_alone_is_not_significant() {
        let current = EnforcerSection::fresh(1, 4);
        let mut next = current.clone();
        next.last_evaluated_at = Some(t0());
        assert!(!significant_change(&current, &next));
        next.trades_today = 1;
        assert!(significant_change(&current, &next));
    }
}
