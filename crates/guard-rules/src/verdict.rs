//! Verdict and flatten-order types.

use guard_core::PositionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why new entries are blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    Cooldown,
    SessionInactive,
    NewsLock,
    BiasExpired,
    TradeLimit,
    ConfigLocked,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cooldown => "cooldown",
            Self::SessionInactive => "session inactive",
            Self::NewsLock => "news lock",
            Self::BiasExpired => "bias expired",
            Self::TradeLimit => "trade limit",
            Self::ConfigLocked => "configuration invalid",
        };
        write!(f, "{s}")
    }
}

/// Why the day is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownReason {
    DailyLoss,
    DailyProfit,
    TradeLimit,
    ConsecutiveLosses,
    /// Already signalled or the controller ended the day.
    DayEnded,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DailyLoss => "daily loss limit",
            Self::DailyProfit => "daily profit target",
            Self::TradeLimit => "max trades per day",
            Self::ConsecutiveLosses => "consecutive losses",
            Self::DayEnded => "day ended",
        };
        write!(f, "{s}")
    }
}

/// The single outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    BlockEntries(BlockReason),
    Flatten(FlattenReason),
    ShutdownDay(ShutdownReason),
    BreakForHour(u32),
}

impl Verdict {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::BlockEntries(_) => "block_entries",
            Self::Flatten(_) => "flatten",
            Self::ShutdownDay(_) => "shutdown_day",
            Self::BreakForHour(_) => "break",
        }
    }

    pub fn allows_entries(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "Allow"),
            Self::BlockEntries(r) => write!(f, "BlockEntries({r})"),
            Self::Flatten(r) => write!(f, "Flatten({r})"),
            Self::ShutdownDay(r) => write!(f, "ShutdownDay({r})"),
            Self::BreakForHour(losses) => write!(f, "BreakForHour({losses} consecutive losses)"),
        }
    }
}

/// Why a single position is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlattenReason {
    DayShutdown,
    LossBreak,
    OutsideHours,
    DailyBreak,
    /// Opened while entries were blocked.
    EntryBlocked(BlockReason),
    OpposesBias,
    ChecklistIncomplete,
    PerTradeLoss,
    LotSize,
    ProfitLock,
}

impl FlattenReason {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::DayShutdown => "day_shutdown",
            Self::LossBreak => "loss_break",
            Self::OutsideHours => "outside_hours",
            Self::DailyBreak => "daily_break",
            Self::EntryBlocked(_) => "entry_blocked",
            Self::OpposesBias => "opposes_bias",
            Self::ChecklistIncomplete => "checklist_incomplete",
            Self::PerTradeLoss => "per_trade_loss",
            Self::LotSize => "lot_size",
            Self::ProfitLock => "profit_lock",
        }
    }
}

impl fmt::Display for FlattenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DayShutdown => write!(f, "day shutdown"),
            Self::LossBreak => write!(f, "loss break"),
            Self::OutsideHours => write!(f, "outside hours"),
            Self::DailyBreak => write!(f, "daily break"),
            Self::EntryBlocked(r) => write!(f, "entry blocked: {r}"),
            Self::OpposesBias => write!(f, "opposes bias"),
            Self::ChecklistIncomplete => write!(f, "checklist incomplete"),
            Self::PerTradeLoss => write!(f, "per-trade loss limit"),
            Self::LotSize => write!(f, "lot size limit"),
            Self::ProfitLock => write!(f, "profit lock"),
        }
    }
}

/// Close one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenOrder {
    pub position_id: PositionId,
    pub reason: FlattenReason,
}
