//! Risk-based position sizing.
//!
//! lots = risk_amount / (pip_distance * pip_value_per_lot)
//!
//! The result is floored to the broker lot step so the requested risk is
//! never exceeded, then clamped to the broker's min/max lot. Raising an
//! order to the minimum lot is the one case where actual risk can exceed
//! the requested risk; the result flags it.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::errors::SizingError;

use super::TradingConfig;

/// Whether min/max lot limits changed the computed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClampReason {
    None,
    RaisedToMin,
    CappedAtMax,
}

/// Output of the position sizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionSize {
    /// Final order size, a multiple of the lot step
    pub lots: Decimal,

    /// Size before rounding and clamping
    pub raw_lots: Decimal,

    /// Money the account intended to risk
    pub risk_amount: Decimal,

    /// Money lost if the stop is hit at `lots`
    pub actual_risk: Decimal,

    /// Entry-to-stop distance in pips
    pub pip_distance: Decimal,

    pub clamped: ClampReason,
}

impl PositionSize {
    /// Actual risk as a percentage of `balance`. Saturates at `Decimal::MAX`.
    pub fn actual_risk_pct(&self, balance: Decimal) -> Decimal {
        if balance.is_zero() {
            return Decimal::ZERO;
        }
        self.actual_risk
            .checked_div(balance)
            .and_then(|ratio| ratio.checked_mul(dec!(100)))
            .unwrap_or(Decimal::MAX)
    }
}

/// Calculator for risk-based lot sizes.
pub struct PositionSizer {
    config: TradingConfig,
}

impl PositionSizer {
    pub fn new(config: TradingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TradingConfig {
        &self.config
    }

    /// Size an order so that hitting the stop loses `risk_pct` percent of `balance`.
    ///
    /// # Arguments
    /// * `balance` - Account balance in USD
    /// * `risk_pct` - Percent of balance to risk (1 = 1%)
    /// * `entry` - Expected fill price
    /// * `stop_loss` - Stop price
    pub fn calculate(
        &self,
        balance: Decimal,
        risk_pct: Decimal,
        entry: Decimal,
        stop_loss: Decimal,
    ) -> Result<PositionSize, SizingError> {
        if balance <= Decimal::ZERO {
            return Err(SizingError::NonPositiveBalance(balance));
        }
        if risk_pct <= Decimal::ZERO || risk_pct > self.config.max_risk_pct {
            return Err(SizingError::RiskOutOfRange {
                risk_pct,
                max_pct: self.config.max_risk_pct,
            });
        }

        let distance = entry
            .checked_sub(stop_loss)
            .ok_or(SizingError::Overflow)?
            .abs();
        let pip_distance = if self.config.pip_size.is_zero() {
            Decimal::ZERO
        } else {
            distance
                .checked_div(self.config.pip_size)
                .ok_or(SizingError::Overflow)?
        };
        if pip_distance.is_zero() {
            return Err(SizingError::ZeroStopDistance { entry, stop_loss });
        }

        let risk_amount = balance
            .checked_mul(risk_pct)
            .map(|amount| amount / dec!(100))
            .ok_or(SizingError::Overflow)?;
        let risk_per_lot = pip_distance
            .checked_mul(self.config.pip_value_per_lot)
            .ok_or(SizingError::Overflow)?;
        let raw_lots = risk_amount
            .checked_div(risk_per_lot)
            .ok_or(SizingError::Overflow)?;

        let stepped = self.floor_to_step(raw_lots).ok_or(SizingError::Overflow)?;
        let (lots, clamped) = if stepped < self.config.min_lot {
            (self.config.min_lot, ClampReason::RaisedToMin)
        } else if stepped > self.config.max_lot {
            (self.config.max_lot, ClampReason::CappedAtMax)
        } else {
            (stepped, ClampReason::None)
        };

        let actual_risk = lots
            .checked_mul(risk_per_lot)
            .ok_or(SizingError::Overflow)?;

        debug!(
            balance = %balance,
            risk_pct = %risk_pct,
            pip_distance = %pip_distance,
            raw_lots = %raw_lots,
            lots = %lots,
            clamped = ?clamped,
            "Position sized"
        );

        Ok(PositionSize {
            lots,
            raw_lots,
            risk_amount,
            actual_risk,
            pip_distance,
            clamped,
        })
    }

    /// Round down to a whole number of lot steps.
    fn floor_to_step(&self, lots: Decimal) -> Option<Decimal> {
        if self.config.lot_step <= Decimal::ZERO {
            return Some(lots);
        }
        lots.checked_div(self.config.lot_step)?
            .floor()
            .checked_mul(self.config.lot_step)
    }
}
