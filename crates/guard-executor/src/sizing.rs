//! Position sizing for a dollar risk.
//!
//! Exposed to the operator through the controller's `size` command.

use crate::error::{ExecutorError, ExecutorResult};
use guard_core::{Lots, Usd};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Instrument contract used for sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Account-currency value of a one point move for one lot.
    #[serde(default = "default_value_per_point")]
    pub value_per_point: Usd,
    #[serde(default = "default_lot_step")]
    pub lot_step: Lots,
}

// XAUUSD: 100 oz per lot.
fn default_value_per_point() -> Usd {
    Usd::new(dec!(100))
}

fn default_lot_step() -> Lots {
    Lots::new(dec!(0.01))
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            value_per_point: default_value_per_point(),
            lot_step: default_lot_step(),
        }
    }
}

impl SizingConfig {
    /// Lots for `risk` over `stop_distance` points, capped at `max_lot`.
    pub fn lots_for(&self, risk: Usd, stop_distance: Decimal, max_lot: Lots) -> ExecutorResult<Lots> {
        lots_for_risk(risk, stop_distance, self.value_per_point, self.lot_step, max_lot)
    }
}

/// Lots such that hitting the stop loses at most `risk`.
///
/// `stop_distance` is in price points, `value_per_point` is the account
/// currency value of one point for one lot. The result is rounded down to
/// `lot_step` and capped at `max_lot`; zero means the risk is too small for
/// one step.
pub fn lots_for_risk(
    risk: Usd,
    stop_distance: Decimal,
    value_per_point: Usd,
    lot_step: Lots,
    max_lot: Lots,
) -> ExecutorResult<Lots> {
    if !risk.is_positive() {
        return Err(ExecutorError::InvalidSizing(format!("risk must be > 0, got {risk}")));
    }
    if stop_distance <= Decimal::ZERO {
        return Err(ExecutorError::InvalidSizing(format!(
            "stop distance must be > 0, got {stop_distance}"
        )));
    }
    if !value_per_point.is_positive() {
        return Err(ExecutorError::InvalidSizing(format!(
            "value per point must be > 0, got {value_per_point}"
        )));
    }

    let loss_per_lot = stop_distance * value_per_point.inner();
    let raw = Lots::new(risk.inner() / loss_per_lot);
    Ok(raw.round_to_step(lot_step).min(max_lot.round_to_step(lot_step)))
}
