//! Rule configuration.
//!
//! Defaults match the tool's shipped limits. [`RulesConfig::validate`] is
//! fail-closed: an enforcer holding an invalid configuration runs locked.

use crate::error::{RulesError, RulesResult};
use chrono::{Duration, NaiveTime};
use chrono_tz::Tz;
use guard_core::{Lots, Usd};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Wall-clock window in local time, `HH:MM` bounds.
///
/// Start inclusive, end exclusive. A window whose start is after its end
/// wraps midnight (e.g. 22:00-02:00).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

impl TimeWindow {
    pub fn new(start: &str, end: &str) -> Self {
        Self {
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    pub fn start_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.start, "%H:%M").ok()
    }

    pub fn end_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.end, "%H:%M").ok()
    }

    /// Unparseable bounds contain nothing.
    pub fn contains(&self, time: NaiveTime) -> bool {
        match (self.start_time(), self.end_time()) {
            (Some(start), Some(end)) => contains(start, end, time),
            _ => false,
        }
    }
}

fn contains(start: NaiveTime, end: NaiveTime, time: NaiveTime) -> bool {
    if start <= end {
        time >= start && time < end
    } else {
        time >= start || time < end
    }
}

/// Daily break: a start time and a duration, may cross midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyBreak {
    pub start: String,
    pub duration_minutes: u32,
}

impl DailyBreak {
    pub fn start_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.start, "%H:%M").ok()
    }

    pub fn end_time(&self) -> Option<NaiveTime> {
        self.start_time()
            .map(|start| start + Duration::minutes(i64::from(self.duration_minutes)))
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.duration_minutes == 0 {
            return false;
        }
        match (self.start_time(), self.end_time()) {
            (Some(start), Some(end)) => contains(start, end, time),
            _ => false,
        }
    }
}

/// Dollar, count and size limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskLimits {
    #[serde(default = "default_max_loss_per_trade")]
    pub max_loss_per_trade: Usd,
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss: Usd,
    #[serde(default = "default_max_daily_profit")]
    pub max_daily_profit: Usd,
    #[serde(default = "default_max_trades_per_day")]
    pub max_trades_per_day: u32,
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,
    #[serde(default = "default_max_lot_size")]
    pub max_lot_size: Lots,
}

fn default_max_loss_per_trade() -> Usd {
    Usd::new(Decimal::from(12))
}

fn default_max_daily_loss() -> Usd {
    Usd::new(Decimal::from(24))
}

fn default_max_daily_profit() -> Usd {
    Usd::new(Decimal::from(35))
}

fn default_max_trades_per_day() -> u32 {
    3
}

fn default_max_consecutive_losses() -> u32 {
    2
}

fn default_max_lot_size() -> Lots {
    Lots::new(Decimal::ONE)
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_loss_per_trade: default_max_loss_per_trade(),
            max_daily_loss: default_max_daily_loss(),
            max_daily_profit: default_max_daily_profit(),
            max_trades_per_day: default_max_trades_per_day(),
            max_consecutive_losses: default_max_consecutive_losses(),
            max_lot_size: default_max_lot_size(),
        }
    }
}

/// Post-trade cooldown lengths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownConfig {
    #[serde(default = "default_base_minutes")]
    pub base_minutes: u32,
    /// Added per losing close.
    #[serde(default = "default_extra_minutes")]
    pub extra_minutes: u32,
}

fn default_base_minutes() -> u32 {
    15
}

fn default_extra_minutes() -> u32 {
    10
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            base_minutes: default_base_minutes(),
            extra_minutes: default_extra_minutes(),
        }
    }
}

impl CooldownConfig {
    pub fn base(&self) -> Duration {
        Duration::minutes(i64::from(self.base_minutes))
    }

    pub fn extra(&self) -> Duration {
        Duration::minutes(i64::from(self.extra_minutes))
    }
}

/// Trading calendar configuration in the operator's local timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// IANA timezone name.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_trading_hours")]
    pub trading_hours: TimeWindow,
    #[serde(default = "default_daily_break")]
    pub daily_break: DailyBreak,
}

fn default_timezone() -> String {
    "Asia/Tehran".to_string()
}

fn default_trading_hours() -> TimeWindow {
    TimeWindow::new("11:00", "21:00")
}

fn default_daily_break() -> DailyBreak {
    DailyBreak {
        start: "16:30".to_string(),
        duration_minutes: 30,
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            trading_hours: default_trading_hours(),
            daily_break: default_daily_break(),
        }
    }
}

impl ScheduleConfig {
    pub fn tz(&self) -> RulesResult<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| RulesError::UnknownTimezone(self.timezone.clone()))
    }
}

/// When a bias stops being trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiasPolicy {
    #[serde(default = "default_bias_expiry_minutes")]
    pub expiry_minutes: u32,
    #[serde(default = "default_bias_max_losses")]
    pub max_losses: u32,
}

fn default_bias_expiry_minutes() -> u32 {
    120
}

fn default_bias_max_losses() -> u32 {
    3
}

impl Default for BiasPolicy {
    fn default() -> Self {
        Self {
            expiry_minutes: default_bias_expiry_minutes(),
            max_losses: default_bias_max_losses(),
        }
    }
}

/// What a consecutive-loss streak does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LossBreakPolicy {
    /// Temporary halt; counters survive, the streak resets when it ends.
    Break { minutes: u32 },
    /// Treat the streak as a full-day shutdown.
    EndDay,
}

impl Default for LossBreakPolicy {
    fn default() -> Self {
        Self::Break { minutes: 60 }
    }
}

/// Everything the rule engine needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub limits: RiskLimits,
    #[serde(default)]
    pub cooldown: CooldownConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub bias: BiasPolicy,
    #[serde(default)]
    pub loss_break: LossBreakPolicy,
    /// Flatten new positions until the pre-trade checklist is complete.
    #[serde(default)]
    pub checklist_enforced: bool,
    /// Strict mode applied when the operator records a bias without saying.
    #[serde(default)]
    pub strict_mode_default: bool,
}

impl RulesConfig {
    /// Check every limit. Returns the first problem found.
    pub fn validate(&self) -> RulesResult<()> {
        let l = &self.limits;
        for (name, value) in [
            ("max_loss_per_trade", l.max_loss_per_trade),
            ("max_daily_loss", l.max_daily_loss),
            ("max_daily_profit", l.max_daily_profit),
        ] {
            if !value.is_positive() {
                return Err(RulesError::Configuration(format!(
                    "{name} must be > 0, got {value}"
                )));
            }
        }
        for (name, value) in [
            ("max_trades_per_day", l.max_trades_per_day),
            ("max_consecutive_losses", l.max_consecutive_losses),
            ("bias.max_losses", self.bias.max_losses),
            ("bias.expiry_minutes", self.bias.expiry_minutes),
        ] {
            if value == 0 {
                return Err(RulesError::Configuration(format!("{name} must be > 0")));
            }
        }
        if l.max_lot_size.inner() <= Decimal::ZERO {
            return Err(RulesError::Configuration(format!(
                "max_lot_size must be > 0, got {}",
                l.max_lot_size
            )));
        }
        if let LossBreakPolicy::Break { minutes: 0 } = self.loss_break {
            return Err(RulesError::Configuration(
                "loss_break.minutes must be > 0".to_string(),
            ));
        }

        let hours = &self.schedule.trading_hours;
        match (hours.start_time(), hours.end_time()) {
            (Some(start), Some(end)) if start == end => {
                return Err(RulesError::Configuration(format!(
                    "trading_hours start and end are both {}",
                    hours.start
                )));
            }
            (Some(_), Some(_)) => {}
            _ => {
                return Err(RulesError::Configuration(format!(
                    "trading_hours must be HH:MM, got {}-{}",
                    hours.start, hours.end
                )));
            }
        }

        let daily_break = &self.schedule.daily_break;
        if daily_break.start_time().is_none() {
            return Err(RulesError::Configuration(format!(
                "daily_break.start must be HH:MM, got {}",
                daily_break.start
            )));
        }
        if daily_break.duration_minutes >= 24 * 60 {
            return Err(RulesError::Configuration(
                "daily_break.duration_minutes must be under 24h".to_string(),
            ));
        }

        self.schedule.tz()?;
        Ok(())
    }
}
