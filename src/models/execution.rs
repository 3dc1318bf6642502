//! Execution model: one auto-trade attempt of a signal on one account.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Signal, SignalDirection};

/// Outcome of an auto-trade attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Order filled, position still open
    Open,
    /// Position closed at stop, target or manually
    Closed,
    /// Broker rejected or errored
    Failed,
    /// Never sent (ineligible account, sizing refused)
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Open => "open",
            ExecutionStatus::Closed => "closed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => bail!("unknown execution status: {}", other),
        }
    }
}

/// A signal executed (or not) on a trading account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub signal_id: String,
    pub account_id: String,
    pub direction: SignalDirection,
    pub status: ExecutionStatus,

    /// Lots filled (zero when skipped or failed)
    pub lots: Decimal,

    /// Fill price, including simulated spread
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,

    /// Broker order reference
    pub order_id: Option<String>,

    pub close_price: Option<Decimal>,
    pub realized_pnl: Option<Decimal>,

    /// Why the attempt was skipped/failed, or how the position closed
    #[serde(default)]
    pub reason: String,

    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Execution {
    /// Record of a filled order carrying the signal's stop and target.
    pub fn opened(
        signal: &Signal,
        account_id: &str,
        lots: Decimal,
        fill_price: Decimal,
        order_id: impl Into<String>,
    ) -> Self {
        Self {
            status: ExecutionStatus::Open,
            lots,
            entry_price: fill_price,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            order_id: Some(order_id.into()),
            ..Self::unfilled(&signal.id, account_id, signal.direction, ExecutionStatus::Open, "")
        }
    }

    /// Record of an attempt that never reached the broker.
    pub fn skipped(
        signal_id: &str,
        account_id: &str,
        direction: SignalDirection,
        reason: impl Into<String>,
    ) -> Self {
        Self::unfilled(signal_id, account_id, direction, ExecutionStatus::Skipped, reason)
    }

    /// Record of an attempt the broker refused.
    pub fn failed(
        signal_id: &str,
        account_id: &str,
        direction: SignalDirection,
        reason: impl Into<String>,
    ) -> Self {
        Self::unfilled(signal_id, account_id, direction, ExecutionStatus::Failed, reason)
    }

    fn unfilled(
        signal_id: &str,
        account_id: &str,
        direction: SignalDirection,
        status: ExecutionStatus,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            signal_id: signal_id.to_string(),
            account_id: account_id.to_string(),
            direction,
            status,
            lots: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            stop_loss: Decimal::ZERO,
            take_profit: Decimal::ZERO,
            order_id: None,
            close_price: None,
            realized_pnl: None,
            reason: reason.into(),
            opened_at: Utc::now(),
            closed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == ExecutionStatus::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_opened_copies_signal_levels() {
        let signal =
            Signal::new("XAUUSD", SignalDirection::Sell, dec!(2350), dec!(2360), dec!(2330)).unwrap();
        let exec = Execution::opened(&signal, "acc-1", dec!(0.25), dec!(2349.85), "ord-9");

        assert!(exec.is_open());
        assert_eq!(exec.signal_id, signal.id);
        assert_eq!(exec.direction, SignalDirection::Sell);
        assert_eq!(exec.stop_loss, dec!(2360));
        assert_eq!(exec.take_profit, dec!(2330));
        assert_eq!(exec.order_id.as_deref(), Some("ord-9"));
    }

    #[test]
    fn test_unfilled_records_have_no_size() {
        let exec = Execution::failed("sig", "acc", SignalDirection::Buy, "broker down");
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert!(exec.lots.is_zero());
        assert_eq!(exec.reason, "broker down");
        assert_eq!("skipped".parse::<ExecutionStatus>().unwrap(), ExecutionStatus::Skipped);
    }
}
