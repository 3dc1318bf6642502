//! Trading configuration: instrument contract size and risk limits.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Instrument and broker constraints used for P&L and position sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Instrument symbol
    pub symbol: String,

    /// Price move that counts as one pip
    pub pip_size: Decimal,

    /// USD value of a one-pip move on one standard lot
    pub pip_value_per_lot: Decimal,

    /// Broker lot granularity
    pub lot_step: Decimal,

    /// Smallest order the broker accepts
    pub min_lot: Decimal,

    /// Largest order the broker accepts
    pub max_lot: Decimal,

    /// Risk percent used for new accounts
    pub default_risk_pct: Decimal,

    /// Upper bound on risk percent per signal
    pub max_risk_pct: Decimal,

    /// Simulated bid/ask spread in price units
    pub spread: Decimal,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            symbol: "XAUUSD".to_string(),
            pip_size: dec!(0.1),          // $0.10 move
            pip_value_per_lot: dec!(10),  // 100 oz contract
            lot_step: dec!(0.01),
            min_lot: dec!(0.01),
            max_lot: dec!(50),
            default_risk_pct: dec!(1),
            max_risk_pct: dec!(10),
            spread: dec!(0.30),
        }
    }
}

impl TradingConfig {
    /// Convert a price distance into pips.
    pub fn to_pips(&self, distance: Decimal) -> Decimal {
        if self.pip_size.is_zero() {
            return Decimal::ZERO;
        }
        distance / self.pip_size
    }
}
