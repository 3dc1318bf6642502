//! Typed validation errors for signals and position sizing.
//!
//! Application code wraps these with `anyhow::Context` when propagating.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::SignalDirection;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    #[error("{field} must be positive, got {value}")]
    NonPositivePrice { field: &'static str, value: Decimal },

    #[error(
        "invalid {direction} levels: expected {expected} (entry {entry}, stop {stop_loss}, target {take_profit})"
    )]
    InvalidLevels {
        direction: SignalDirection,
        expected: &'static str,
        entry: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
    },

    #[error("unknown signal direction: {0}")]
    UnknownDirection(String),

    #[error("unknown signal status: {0}")]
    UnknownStatus(String),

    #[error("signal {id} is already {status}")]
    AlreadyTerminal { id: String, status: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SizingError {
    #[error("account balance must be positive, got {0}")]
    NonPositiveBalance(Decimal),

    #[error("risk percent {risk_pct}% outside (0, {max_pct}%]")]
    RiskOutOfRange { risk_pct: Decimal, max_pct: Decimal },

    #[error("stop distance is zero (entry {entry}, stop {stop_loss})")]
    ZeroStopDistance { entry: Decimal, stop_loss: Decimal },

    #[error("position size calculation overflowed")]
    Overflow,
}
