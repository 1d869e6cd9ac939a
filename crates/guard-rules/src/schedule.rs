//! Cooldown and break scheduling.
//!
//! Every restriction is a deadline compared against wall-clock time on each
//! tick. Nothing here schedules a callback: a missed tick only delays
//! noticing an expiry, it never expires anything early.

use crate::config::{CooldownConfig, ScheduleConfig};
use crate::error::RulesResult;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use guard_core::EnforcerSection;
use tracing::debug;

/// Trading-hour and daily-break windows in the operator's local time.
#[derive(Debug, Clone)]
pub struct TradingCalendar {
    tz: Tz,
    config: ScheduleConfig,
}

impl TradingCalendar {
    pub fn new(config: ScheduleConfig) -> RulesResult<Self> {
        let tz = config.tz()?;
        Ok(Self { tz, config })
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn local_time(&self, now: DateTime<Utc>) -> NaiveTime {
        now.with_timezone(&self.tz).time()
    }

    /// Local calendar date; day rollover happens at local midnight.
    pub fn trading_day(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    pub fn within_trading_hours(&self, now: DateTime<Utc>) -> bool {
        self.config.trading_hours.contains(self.local_time(now))
    }

    pub fn in_daily_break(&self, now: DateTime<Utc>) -> bool {
        self.config.daily_break.contains(self.local_time(now))
    }
}

/// A position opened: start the base cooldown.
///
/// An open during a running cooldown never shortens it.
pub fn on_open(section: &mut EnforcerSection, opened_at: DateTime<Utc>, config: &CooldownConfig) {
    let deadline = opened_at + config.base();
    match section.active_cooldown(opened_at) {
        Some(current) => {
            section.cooldown_until = Some(current.max(deadline));
        }
        None => {
            section.cooldown_until = Some(deadline);
            section.cooldown_started_at = Some(opened_at);
        }
    }
    debug!(until = ?section.cooldown_until, "Cooldown set on open");
}

/// A position closed at a loss: extend a running cooldown by the extra
/// minutes, or start a fresh `base + extra` one.
pub fn on_loss(section: &mut EnforcerSection, closed_at: DateTime<Utc>, config: &CooldownConfig) {
    match section.active_cooldown(closed_at) {
        Some(current) => {
            section.cooldown_until = Some(current + config.extra());
        }
        None => {
            section.cooldown_until = Some(closed_at + config.base() + config.extra());
            section.cooldown_started_at = Some(closed_at);
        }
    }
    debug!(until = ?section.cooldown_until, "Cooldown extended on loss");
}

/// Minutes left on the cooldown, rounded up. Display only.
pub fn cooldown_minutes_remaining(section: &EnforcerSection, now: DateTime<Utc>) -> i64 {
    section
        .active_cooldown(now)
        .map(|until| {
            let secs = (until - now).num_seconds();
            (secs + 59) / 60
        })
        .unwrap_or(0)
}

/// Start a consecutive-loss break. A break already running keeps its deadline.
pub fn start_break(section: &mut EnforcerSection, now: DateTime<Utc>, minutes: u32) {
    if section.break_active {
        return;
    }
    section.break_active = true;
    section.break_until = Some(now + Duration::minutes(i64::from(minutes)));
}

/// End a break whose deadline has passed. Returns true if it ended.
///
/// The loss streak resets with it, otherwise the same streak would start
/// the next break immediately.
pub fn expire_break(section: &mut EnforcerSection, now: DateTime<Utc>) -> bool {
    if !section.break_active {
        return false;
    }
    match section.break_until {
        Some(until) if now < until => false,
        _ => {
            section.break_active = false;
            section.break_until = None;
            section.consecutive_losses = 0;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    #[test]
    fn test_open_then_loss_extends_from_open() {
        let config = CooldownConfig::default();
        let mut section = EnforcerSection::default();

        on_open(&mut section, t(8, 0), &config);
        assert_eq!(section.cooldown_until, Some(t(8, 15)));

        on_loss(&mut section, t(8, 5), &config);
        assert_eq!(section.cooldown_until, Some(t(8, 25)));
        assert_eq!(section.cooldown_started_at, Some(t(8, 0)));
    }

    #[test]
    fn test_loss_without_cooldown_starts_base_plus_extra() {
        let config = CooldownConfig::default();
        let mut section = EnforcerSection::default();
        on_loss(&mut section, t(9, 0), &config);
        assert_eq!(section.cooldown_until, Some(t(9, 25)));
        assert_eq!(section.cooldown_started_at, Some(t(9, 0)));
    }

    #[test]
    fn test_repeated_losses_accumulate() {
        let config = CooldownConfig::default();
        let mut section = EnforcerSection::default();
        on_loss(&mut section, t(9, 0), &config);
        on_loss(&mut section, t(9, 1), &config);
        assert_eq!(section.cooldown_until, Some(t(9, 35)));
    }

    #[test]
    fn test_open_during_cooldown_never_shortens() {
        let config = CooldownConfig::default();
        let mut section = EnforcerSection::default();
        on_loss(&mut section, t(9, 0), &config);
        on_open(&mut section, t(9, 1), &config);
        assert_eq!(section.cooldown_until, Some(t(9, 25)));
        assert_eq!(section.cooldown_started_at, Some(t(9, 0)));
    }

    #[test]
    fn test_minutes_remaining_rounds_up() {
        let mut section = EnforcerSection::default();
        section.cooldown_until = Some(t(9, 10));
        assert_eq!(cooldown_minutes_remaining(&section, t(9, 0)), 10);
        let now = t(9, 0) + Duration::seconds(30);
        assert_eq!(cooldown_minutes_remaining(&section, now), 10);
        assert_eq!(cooldown_minutes_remaining(&section, t(9, 10)), 0);
    }

    #[test]
    fn test_break_lifecycle() {
        let mut section = EnforcerSection {
            consecutive_losses: 2,
            ..EnforcerSection::default()
        };
        start_break(&mut section, t(10, 0), 60);
        assert!(section.break_active);
        assert_eq!(section.break_until, Some(t(11, 0)));

        start_break(&mut section, t(10, 30), 60);
        assert_eq!(section.break_until, Some(t(11, 0)));

        assert!(!expire_break(&mut section, t(10, 59)));
        assert!(expire_break(&mut section, t(11, 0)));
        assert!(!section.break_active);
        assert_eq!(section.consecutive_losses, 0);
    }

    #[test]
    fn test_calendar_uses_local_time() {
        let calendar = TradingCalendar::new(ScheduleConfig::default()).unwrap();
        // Tehran is UTC+03:30.
        assert!(!calendar.within_trading_hours(Utc.with_ymd_and_hms(2026, 3, 2, 7, 29, 0).unwrap()));
        assert!(calendar.within_trading_hours(Utc.with_ymd_and_hms(2026, 3, 2, 7, 30, 0).unwrap()));
        assert!(calendar.in_daily_break(Utc.with_ymd_and_hms(2026, 3, 2, 13, 0, 0).unwrap()));
        assert!(!calendar.in_daily_break(Utc.with_ymd_and_hms(2026, 3, 2, 13, 30, 0).unwrap()));
    }

    #[test]
    fn test_trading_day_rolls_at_local_midnight() {
        let calendar = TradingCalendar::new(ScheduleConfig::default()).unwrap();
        let before = Utc.with_ymd_and_hms(2026, 3, 2, 20, 29, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 2, 20, 30, 0).unwrap();
        assert_eq!(calendar.trading_day(before), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(calendar.trading_day(after), NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
    }
}
