//! Trading enums and venue data types.

use crate::decimal::{Lots, Usd};
use crate::error::CoreError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operator's declared directional stance for the day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    #[default]
    Neutral,
    Bullish,
    Bearish,
}

impl Bias {
    /// True for bullish or bearish.
    pub fn is_directional(&self) -> bool {
        !matches!(self, Self::Neutral)
    }

    /// The position direction this bias permits, if any.
    pub fn permitted_direction(&self) -> Option<Direction> {
        match self {
            Self::Bullish => Some(Direction::Buy),
            Self::Bearish => Some(Direction::Sell),
            Self::Neutral => None,
        }
    }
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Neutral => write!(f, "neutral"),
            Self::Bullish => write!(f, "bullish"),
            Self::Bearish => write!(f, "bearish"),
        }
    }
}

impl FromStr for Bias {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "neutral" => Ok(Self::Neutral),
            "bullish" | "long" => Ok(Self::Bullish),
            "bearish" | "short" => Ok(Self::Bearish),
            other => Err(CoreError::InvalidBias(other.to_string())),
        }
    }
}

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// Returns the opposite direction.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// True when a position in this direction goes against a directional bias.
    pub fn opposes(&self, bias: Bias) -> bool {
        bias.permitted_direction()
            .is_some_and(|permitted| permitted != *self)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Outcome of the most recently closed trade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeResult {
    #[default]
    None,
    Win,
    Loss,
}

impl TradeResult {
    /// Classify a realized net P&L. Breakeven counts as a win: it does not
    /// extend cooldowns or streaks.
    pub fn from_pnl(pnl: Usd) -> Self {
        if pnl.is_negative() {
            Self::Loss
        } else {
            Self::Win
        }
    }
}

/// Venue-assigned position identifier (MT5 ticket style).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A live open position as reported by the execution venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: String,
    pub direction: Direction,
    pub volume: Lots,
    /// Unrealized P&L in account currency (negative = losing).
    pub floating_pnl: Usd,
    pub opened_at: DateTime<Utc>,
}

/// Whether a trade event reports an entry or an exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeEventKind {
    Open,
    Close,
}

/// Ephemeral event produced by the venue when a position opens or closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub kind: TradeEventKind,
    pub position_id: PositionId,
    pub symbol: String,
    pub direction: Direction,
    pub volume: Lots,
    /// Realized net P&L, present on close only.
    pub net_pnl: Option<Usd>,
    pub opened_at: DateTime<Utc>,
    /// When the venue observed the event (equals `opened_at` for opens).
    pub at: DateTime<Utc>,
}

impl TradeEvent {
    /// Build an open event for a position.
    pub fn opened(position: &Position) -> Self {
        Self {
            kind: TradeEventKind::Open,
            position_id: position.id,
            symbol: position.symbol.clone(),
            direction: position.direction,
            volume: position.volume,
            net_pnl: None,
            opened_at: position.opened_at,
            at: position.opened_at,
        }
    }

    /// Build a close event for a position with its realized P&L.
    pub fn closed(position: &Position, net_pnl: Usd, at: DateTime<Utc>) -> Self {
        Self {
            kind: TradeEventKind::Close,
            position_id: position.id,
            symbol: position.symbol.clone(),
            direction: position.direction,
            volume: position.volume,
            net_pnl: Some(net_pnl),
            opened_at: position.opened_at,
            at,
        }
    }
}

/// Classification of a completed trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayResult {
    Green,
    Red,
    Flat,
}

impl DayResult {
    pub fn from_pnl(pnl: Usd) -> Self {
        if pnl.is_positive() {
            Self::Green
        } else if pnl.is_negative() {
            Self::Red
        } else {
            Self::Flat
        }
    }
}

/// One row of daily history, owned by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub net_pnl: Usd,
    pub trades: u32,
    pub result: DayResult,
}

impl DailyRecord {
    pub fn new(date: NaiveDate, net_pnl: Usd, trades: u32) -> Self {
        Self {
            date,
            net_pnl,
            trades,
            result: DayResult::from_pnl(net_pnl),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_direction_opposes_bias() {
        assert!(Direction::Sell.opposes(Bias::Bullish));
        assert!(Direction::Buy.opposes(Bias::Bearish));
        assert!(!Direction::Buy.opposes(Bias::Bullish));
        assert!(!Direction::Buy.opposes(Bias::Neutral));
        assert!(!Direction::Sell.opposes(Bias::Neutral));
    }

    #[test]
    fn test_bias_parse() {
        assert_eq!("Bullish".parse::<Bias>().unwrap(), Bias::Bullish);
        assert_eq!(" bearish ".parse::<Bias>().unwrap(), Bias::Bearish);
        assert_eq!("neutral".parse::<Bias>().unwrap(), Bias::Neutral);
        assert!("sideways".parse::<Bias>().is_err());
    }

    #[test]
    fn test_trade_result_from_pnl() {
        assert_eq!(TradeResult::from_pnl(Usd::new(dec!(-0.5))), TradeResult::Loss);
        assert_eq!(TradeResult::from_pnl(Usd::ZERO), TradeResult::Win);
        assert_eq!(TradeResult::from_pnl(Usd::new(dec!(4))), TradeResult::Win);
    }

    #[test]
    fn test_daily_record_classification() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(DailyRecord::new(day, Usd::new(dec!(-3)), 2).result, DayResult::Red);
        assert_eq!(DailyRecord::new(day, Usd::new(dec!(3)), 2).result, DayResult::Green);
        assert_eq!(DailyRecord::new(day, Usd::ZERO, 0).result, DayResult::Flat);
    }

    #[test]
    fn test_bias_serde_lowercase() {
        let json = serde_json::to_string(&Bias::Bearish).unwrap();
        assert_eq!(json, "\"bearish\"");
    }
}
