//! Operator console for the paper venue.
//!
//! Lets an operator rehearse a session against the enforcer without a live
//! terminal: open positions, mark their P&L, close them by hand.

use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use guard_core::{Direction, Lots, PositionId, Usd};
use guard_executor::{ExecutionVenue, PaperVenue};
use std::str::FromStr;

const DEFAULT_SYMBOL: &str = "XAUUSD";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaperCommand {
    Open {
        direction: Direction,
        volume: Lots,
        symbol: String,
    },
    /// Mark a position's floating P&L.
    Mark(PositionId, Usd),
    Close(PositionId),
    Positions,
}

fn parse_id(word: &str) -> AppResult<PositionId> {
    word.trim_start_matches('#')
        .parse::<u64>()
        .map(PositionId)
        .map_err(|e| AppError::Command(format!("invalid position id {word}: {e}")))
}

impl FromStr for PaperCommand {
    type Err = AppError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["open", side, volume, rest @ ..] if rest.len() <= 1 => {
                let direction = match side.to_ascii_lowercase().as_str() {
                    "buy" => Direction::Buy,
                    "sell" => Direction::Sell,
                    other => return Err(AppError::Command(format!("invalid side: {other}"))),
                };
                let volume = Lots::from_str(volume)
                    .map_err(|e| AppError::Command(format!("invalid volume {volume}: {e}")))?;
                Ok(Self::Open {
                    direction,
                    volume,
                    symbol: rest.first().unwrap_or(&DEFAULT_SYMBOL).to_ascii_uppercase(),
                })
            }
            ["pnl", id, amount] => {
                let pnl = Usd::from_str(amount)
                    .map_err(|e| AppError::Command(format!("invalid amount {amount}: {e}")))?;
                Ok(Self::Mark(parse_id(id)?, pnl))
            }
            ["close", id] => Ok(Self::Close(parse_id(id)?)),
            ["positions"] => Ok(Self::Positions),
            _ => Err(AppError::Command(format!("unknown command: {}", line.trim()))),
        }
    }
}

/// Apply a command and return the reply for the operator.
pub async fn apply(venue: &PaperVenue, command: PaperCommand, now: DateTime<Utc>) -> AppResult<String> {
    match command {
        PaperCommand::Open {
            direction,
            volume,
            symbol,
        } => {
            let position = venue.open(&symbol, direction, volume, now);
            Ok(format!("opened {} {direction} {volume} {symbol}", position.id))
        }
        PaperCommand::Mark(id, pnl) => {
            if !venue.is_open(id) {
                return Err(AppError::Command(format!("no open position {id}")));
            }
            venue.set_floating(id, pnl);
            Ok(format!("{id} floating {pnl}"))
        }
        PaperCommand::Close(id) => {
            venue.submit_close(id).await?;
            Ok(format!("closed {id}"))
        }
        PaperCommand::Positions => {
            let positions = venue.list_open_positions().await?;
            if positions.is_empty() {
                return Ok("no open positions".to_string());
            }
            Ok(positions
                .iter()
                .map(|p| {
                    format!(
                        "{} {} {} {} floating {}",
                        p.id, p.symbol, p.direction, p.volume, p.floating_pnl
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"))
        }
    }
}
