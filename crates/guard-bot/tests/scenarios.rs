//! End-to-end discipline scenarios: controller and enforcer converging
//! through a real session file.

mod common;

use chrono::{DateTime, NaiveDate, Utc};
use common::{tehran, Harness};
use guard_bot::StartOutcome;
use guard_bridge::SessionStore;
use guard_core::{Bias, DailyRecord, Direction, Lots, PositionId, Usd};
use guard_executor::{ExecutionVenue, PaperVenue};
use guard_persistence::DailyHistory;
use guard_rules::{BlockReason, FlattenReason, ShutdownReason, Verdict};
use rust_decimal_macros::dec;

/// Operator opens a trade and closes it by hand at `pnl`.
async fn manual_trade(
    venue: &PaperVenue,
    opened_at: DateTime<Utc>,
    closed_at: DateTime<Utc>,
    pnl: Usd,
) -> PositionId {
    let p = venue.open("XAUUSD", Direction::Buy, Lots::new(dec!(0.1)), opened_at);
    venue.set_floating(p.id, pnl);
    venue.set_clock(closed_at);
    venue.submit_close(p.id).await.unwrap();
    p.id
}

#[tokio::test]
async fn consecutive_losses_start_an_hour_break_before_daily_loss_limit() {
    let h = Harness::new();
    let mut controller = h.controller(tehran(12, 0, 0));
    assert_eq!(controller.start_session(tehran(12, 0, 0)).unwrap(), StartOutcome::Started);
    assert_eq!(h.terminal.launches(), 1);

    let mut enforcer = h.enforcer(tehran(12, 0, 0));
    assert_eq!(enforcer.tick(tehran(12, 0, 0)).await.unwrap().verdict, Verdict::Allow);

    manual_trade(&h.venue, tehran(12, 1, 0), tehran(12, 2, 0), Usd::new(dec!(-10))).await;
    let report = enforcer.tick(tehran(12, 3, 0)).await.unwrap();
    assert_eq!(report.verdict, Verdict::BlockEntries(BlockReason::Cooldown));
    assert_eq!(enforcer.section().consecutive_losses, 1);

    manual_trade(&h.venue, tehran(12, 30, 0), tehran(12, 31, 0), Usd::new(dec!(-10))).await;
    let report = enforcer.tick(tehran(12, 32, 0)).await.unwrap();
    assert_eq!(report.verdict, Verdict::BreakForHour(2));

    let section = enforcer.section();
    assert_eq!(section.consecutive_losses, 2);
    assert_eq!(section.daily_loss_usd, Usd::new(dec!(20)));
    assert!(section.break_active);
    assert!(!section.shutdown_signal);
    assert!(!section.trading_allowed);

    // The controller sees the break and will not relaunch a dead terminal.
    h.terminal.crash();
    controller.tick(tehran(12, 33, 0));
    assert_eq!(h.terminal.launches(), 1);
    assert!(controller.section().session_active);

    // A third trade during the break is closed on the next tick.
    let third = h
        .venue
        .open("XAUUSD", Direction::Buy, Lots::new(dec!(0.1)), tehran(12, 40, 0));
    let report = enforcer.tick(tehran(12, 41, 0)).await.unwrap();
    assert_eq!(report.verdict, Verdict::BreakForHour(2));
    assert_eq!(report.closes.closed, vec![third.id]);
    assert!(!h.venue.is_open(third.id));
}

#[tokio::test]
async fn position_opened_before_trading_hours_is_flattened() {
    let h = Harness::new();
    let mut controller = h.controller(tehran(10, 50, 0));
    controller.start_session(tehran(10, 50, 0)).unwrap();

    let mut enforcer = h.enforcer(tehran(10, 50, 0));
    enforcer.tick(tehran(10, 58, 0)).await.unwrap();

    let p = h
        .venue
        .open("EURUSD", Direction::Buy, Lots::new(dec!(0.1)), tehran(10, 59, 0));
    let report = enforcer.tick(tehran(10, 59, 30)).await.unwrap();

    assert_eq!(report.verdict, Verdict::Flatten(FlattenReason::OutsideHours));
    assert_eq!(report.closes.closed, vec![p.id]);
    assert!(!h.venue.is_open(p.id));
}

#[tokio::test]
async fn loss_during_cooldown_extends_from_the_open() {
    let h = Harness::new();
    let mut controller = h.controller(tehran(12, 0, 0));
    controller.start_session(tehran(12, 0, 0)).unwrap();
    let mut enforcer = h.enforcer(tehran(12, 0, 0));
    enforcer.tick(tehran(12, 0, 0)).await.unwrap();

    let p = h
        .venue
        .open("XAUUSD", Direction::Buy, Lots::new(dec!(0.1)), tehran(12, 10, 0));
    enforcer.tick(tehran(12, 11, 0)).await.unwrap();
    assert_eq!(enforcer.section().cooldown_until, Some(tehran(12, 25, 0)));
    // The trade that started the cooldown is not an entry made during it.
    assert!(h.venue.is_open(p.id));

    h.venue.set_floating(p.id, Usd::new(dec!(-6)));
    h.venue.set_clock(tehran(12, 15, 0));
    h.venue.submit_close(p.id).await.unwrap();
    enforcer.tick(tehran(12, 16, 0)).await.unwrap();

    let section = enforcer.section();
    assert_eq!(section.cooldown_until, Some(tehran(12, 35, 0)));
    assert_eq!(section.cooldown_started_at, Some(tehran(12, 10, 0)));

    // Visible to the controller through the store.
    controller.tick(tehran(12, 17, 0));
    assert_eq!(
        controller.status().enforcer.cooldown_until,
        Some(tehran(12, 35, 0))
    );
}

#[tokio::test]
async fn strict_mode_flattens_position_against_bias() {
    let h = Harness::new();
    let mut controller = h.controller(tehran(12, 0, 0));
    controller
        .set_bias(Bias::Bullish, Some(dec!(2310.5)), true, tehran(11, 55, 0))
        .unwrap();
    controller.start_session(tehran(12, 0, 0)).unwrap();

    let mut enforcer = h.enforcer(tehran(12, 0, 0));
    enforcer.tick(tehran(12, 0, 0)).await.unwrap();

    let p = h
        .venue
        .open("XAUUSD", Direction::Sell, Lots::new(dec!(0.1)), tehran(12, 5, 0));
    h.venue.set_floating(p.id, Usd::new(dec!(3)));
    let report = enforcer.tick(tehran(12, 5, 30)).await.unwrap();

    assert_eq!(report.closes.closed, vec![p.id]);
    assert!(!h.venue.is_open(p.id));
}

#[tokio::test]
async fn two_red_days_veto_the_session() {
    let h = Harness::new();
    let history = DailyHistory::new(&h.config.controller.history_path);
    for (day, pnl) in [(27, dec!(-15)), (28, dec!(-24))] {
        history
            .record_day(DailyRecord::new(
                NaiveDate::from_ymd_opt(2026, 2, day).unwrap(),
                Usd::new(pnl),
                3,
            ))
            .unwrap();
    }

    let mut controller = h.controller(tehran(11, 30, 0));
    assert_eq!(
        controller.start_session(tehran(11, 30, 0)).unwrap(),
        StartOutcome::RecoveryDay
    );
    assert_eq!(h.terminal.launches(), 0);

    let mut enforcer = h.enforcer(tehran(11, 31, 0));
    let report = enforcer.tick(tehran(11, 31, 0)).await.unwrap();
    assert_eq!(report.verdict, Verdict::ShutdownDay(ShutdownReason::DayEnded));

    let doc = h.store().load().unwrap();
    assert!(!doc.controller.session_active);
    assert!(!doc.enforcer.trading_allowed);
    assert_eq!(doc.enforcer.epoch, 1);
    assert_eq!(doc.enforcer.trades_today, 0);
    assert_eq!(doc.enforcer.daily_loss_usd, Usd::ZERO);
}

#[tokio::test]
async fn daily_loss_limit_shuts_the_day_down_end_to_end() {
    let h = Harness::new();
    let mut controller = h.controller(tehran(12, 0, 0));
    controller.start_session(tehran(12, 0, 0)).unwrap();
    let mut enforcer = h.enforcer(tehran(12, 0, 0));
    enforcer.tick(tehran(12, 0, 0)).await.unwrap();

    manual_trade(&h.venue, tehran(12, 1, 0), tehran(12, 2, 0), Usd::new(dec!(-11))).await;
    manual_trade(&h.venue, tehran(12, 40, 0), tehran(12, 41, 0), Usd::new(dec!(-13))).await;
    let report = enforcer.tick(tehran(12, 42, 0)).await.unwrap();
    assert_eq!(report.verdict, Verdict::ShutdownDay(ShutdownReason::DailyLoss));

    controller.tick(tehran(12, 43, 0));
    assert!(controller.section().day_ended);
    assert!(!controller.section().session_active);
    assert_eq!(h.terminal.kills(), 1);

    let records = controller.history().load().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].net_pnl, Usd::new(dec!(-24)));
    assert_eq!(records[0].trades, 2);

    assert_eq!(
        controller.start_session(tehran(13, 30, 0)).unwrap(),
        StartOutcome::AlreadyEnded
    );
}

#[tokio::test]
async fn restarted_enforcer_keeps_the_days_counters() {
    let h = Harness::new();
    let mut controller = h.controller(tehran(12, 0, 0));
    controller.start_session(tehran(12, 0, 0)).unwrap();

    {
        let mut enforcer = h.enforcer(tehran(12, 0, 0));
        enforcer.tick(tehran(12, 0, 0)).await.unwrap();
        manual_trade(&h.venue, tehran(12, 1, 0), tehran(12, 2, 0), Usd::new(dec!(-8))).await;
        enforcer.tick(tehran(12, 3, 0)).await.unwrap();
    }

    let mut enforcer = h.enforcer(tehran(12, 4, 0));
    assert_eq!(enforcer.section().daily_loss_usd, Usd::new(dec!(8)));
    enforcer.tick(tehran(12, 5, 0)).await.unwrap();
    let section = enforcer.section();
    assert_eq!(section.trades_today, 1);
    assert_eq!(section.consecutive_losses, 1);
    assert_eq!(section.epoch, 1);
}
