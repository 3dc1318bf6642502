//! Wire and value types shared by the price feed and broker.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::models::SignalDirection;

/// Quote response from the external price endpoint.
///
/// Providers either send a bid/ask pair or a single `price`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub bid: Option<Decimal>,
    #[serde(default)]
    pub ask: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Unix seconds
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Bid/ask snapshot for the instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Quote with no spread.
    pub fn flat(symbol: impl Into<String>, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            bid: price,
            ask: price,
            timestamp: Utc::now(),
        }
    }

    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / dec!(2)
    }

    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// Price a market order in `direction` would fill at.
    pub fn fill_price(&self, direction: SignalDirection) -> Decimal {
        match direction {
            SignalDirection::Buy => self.ask,
            SignalDirection::Sell => self.bid,
        }
    }
}

/// Market order with attached stop and target.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    pub account_id: String,
    pub symbol: String,
    pub direction: SignalDirection,
    pub lots: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,

    /// Client reference, usually the signal id
    pub client_ref: String,
}

/// Broker confirmation of a filled order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFill {
    pub order_id: String,
    pub fill_price: Decimal,
    pub lots: Decimal,
    pub filled_at: DateTime<Utc>,
}
