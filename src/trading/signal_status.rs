//! Signal status classification and P&L against the current price.
//!
//! A signal stays `Active` while price sits strictly between its stop and
//! target. Touching either level settles it, and once settled it never
//! changes again. Settled signals report P&L at the level that was hit,
//! not at whatever price overshot it.

use rust_decimal::Decimal;
use tracing::debug;

use crate::models::{Signal, SignalDirection, SignalStatus};

use super::TradingConfig;

/// Classify a trade's levels against `price`.
pub fn classify(
    direction: SignalDirection,
    stop_loss: Decimal,
    take_profit: Decimal,
    price: Decimal,
) -> SignalStatus {
    match direction {
        SignalDirection::Buy => {
            if price >= take_profit {
                SignalStatus::HitTarget
            } else if price <= stop_loss {
                SignalStatus::HitStop
            } else {
                SignalStatus::Active
            }
        }
        SignalDirection::Sell => {
            if price <= take_profit {
                SignalStatus::HitTarget
            } else if price >= stop_loss {
                SignalStatus::HitStop
            } else {
                SignalStatus::Active
            }
        }
    }
}

/// Signed pip move from `entry` to `price`; positive is in the trade's favour.
pub fn pips(
    direction: SignalDirection,
    entry: Decimal,
    price: Decimal,
    config: &TradingConfig,
) -> Decimal {
    config.to_pips((price - entry) * direction.sign())
}

/// Money P&L for `lots` moved from `entry` to `price`.
pub fn pnl(
    direction: SignalDirection,
    entry: Decimal,
    price: Decimal,
    lots: Decimal,
    config: &TradingConfig,
) -> Decimal {
    pips(direction, entry, price, config) * config.pip_value_per_lot * lots
}

/// Price a hit settles at: the level itself.
pub fn settle_price(
    status: SignalStatus,
    stop_loss: Decimal,
    take_profit: Decimal,
    price: Decimal,
) -> Decimal {
    match status {
        SignalStatus::HitTarget => take_profit,
        SignalStatus::HitStop => stop_loss,
        _ => price,
    }
}

/// Result of evaluating a signal at a price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalEvaluation {
    pub status: SignalStatus,

    /// Price used for P&L (settle price when terminal)
    pub mark_price: Decimal,

    /// Pips from entry to `mark_price`
    pub pips: Decimal,

    /// USD P&L of one standard lot
    pub pnl_per_lot: Decimal,

    /// Whether this evaluation moved an active signal into a terminal status
    pub transitioned: bool,
}

impl SignalEvaluation {
    pub fn is_win(&self) -> bool {
        self.pips > Decimal::ZERO
    }
}

/// Evaluate a signal at the current price.
///
/// Terminal signals are frozen at their close price; `price` is ignored.
pub fn evaluate(signal: &Signal, price: Decimal, config: &TradingConfig) -> SignalEvaluation {
    let (status, mark_price, transitioned) = if signal.status.is_terminal() {
        let frozen = signal.close_price.unwrap_or(signal.entry_price);
        (signal.status, frozen, false)
    } else {
        let status = classify(signal.direction, signal.stop_loss, signal.take_profit, price);
        let mark = settle_price(status, signal.stop_loss, signal.take_profit, price);
        (status, mark, status.is_terminal())
    };

    let pips = pips(signal.direction, signal.entry_price, mark_price, config);

    if transitioned {
        debug!(
            signal = %signal.id,
            status = %status,
            price = %price,
            settle = %mark_price,
            "Signal level reached"
        );
    }

    SignalEvaluation {
        status,
        mark_price,
        pips,
        pnl_per_lot: pips * config.pip_value_per_lot,
        transitioned,
    }
}
