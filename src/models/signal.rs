//! Signal model: a recommended XAUUSD trade with entry, stop-loss and take-profit.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::SignalError;

use super::SubscriptionTier;

/// Direction of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalDirection {
    Buy,
    Sell,
}

impl SignalDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalDirection::Buy => "BUY",
            SignalDirection::Sell => "SELL",
        }
    }

    /// +1 for buys, -1 for sells. Multiplying a raw price move by this
    /// gives the favourable move.
    pub fn sign(&self) -> Decimal {
        match self {
            SignalDirection::Buy => Decimal::ONE,
            SignalDirection::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalDirection {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" | "LONG" => Ok(Self::Buy),
            "SELL" | "SHORT" => Ok(Self::Sell),
            _ => Err(SignalError::UnknownDirection(s.to_string())),
        }
    }
}

/// Lifecycle status of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    #[default]
    Active,
    HitTarget,
    HitStop,
    Closed,
    Cancelled,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Active => "active",
            SignalStatus::HitTarget => "hit_target",
            SignalStatus::HitStop => "hit_stop",
            SignalStatus::Closed => "closed",
            SignalStatus::Cancelled => "cancelled",
        }
    }

    /// Everything except `Active` is final.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SignalStatus::Active)
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalStatus {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "hit_target" | "tp" => Ok(Self::HitTarget),
            "hit_stop" | "sl" => Ok(Self::HitStop),
            "closed" => Ok(Self::Closed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(SignalError::UnknownStatus(s.to_string())),
        }
    }
}

/// A published trading signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,

    /// Instrument symbol (always XAUUSD for now)
    pub symbol: String,

    pub direction: SignalDirection,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,

    #[serde(default)]
    pub status: SignalStatus,

    /// Lowest tier that sees the live levels while the signal is active
    #[serde(default)]
    pub min_tier: SubscriptionTier,

    #[serde(default)]
    pub note: String,

    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,

    /// Price the signal settled at once terminal
    pub close_price: Option<Decimal>,
}

impl Signal {
    /// Create a new active signal, validating its price levels.
    pub fn new(
        symbol: impl Into<String>,
        direction: SignalDirection,
        entry_price: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
    ) -> Result<Self, SignalError> {
        validate_levels(direction, entry_price, stop_loss, take_profit)?;

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            direction,
            entry_price,
            stop_loss,
            take_profit,
            status: SignalStatus::Active,
            min_tier: SubscriptionTier::Premium,
            note: String::new(),
            created_at: Utc::now(),
            closed_at: None,
            close_price: None,
        })
    }

    pub fn with_min_tier(mut self, tier: SubscriptionTier) -> Self {
        self.min_tier = tier;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == SignalStatus::Active
    }

    /// Distance from entry to stop in price units.
    pub fn risk_distance(&self) -> Decimal {
        (self.entry_price - self.stop_loss).abs()
    }

    /// Distance from entry to target in price units.
    pub fn reward_distance(&self) -> Decimal {
        (self.take_profit - self.entry_price).abs()
    }

    /// Reward-to-risk ratio (e.g. 2.0 means the target is twice as far as the stop).
    pub fn risk_reward(&self) -> Decimal {
        let risk = self.risk_distance();
        if risk.is_zero() {
            return Decimal::ZERO;
        }
        self.reward_distance() / risk
    }

    /// Move the signal into a terminal status.
    pub fn settle(
        &mut self,
        status: SignalStatus,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<(), SignalError> {
        if self.status.is_terminal() {
            return Err(SignalError::AlreadyTerminal {
                id: self.id.clone(),
                status: self.status.to_string(),
            });
        }
        self.status = status;
        self.close_price = Some(price);
        self.closed_at = Some(at);
        Ok(())
    }
}

/// Check that stop and target sit on the correct sides of the entry.
pub fn validate_levels(
    direction: SignalDirection,
    entry_price: Decimal,
    stop_loss: Decimal,
    take_profit: Decimal,
) -> Result<(), SignalError> {
    for (field, value) in [
        ("entry_price", entry_price),
        ("stop_loss", stop_loss),
        ("take_profit", take_profit),
    ] {
        if value <= Decimal::ZERO {
            return Err(SignalError::NonPositivePrice { field, value });
        }
    }

    let (ok, expected) = match direction {
        SignalDirection::Buy => (
            stop_loss < entry_price && entry_price < take_profit,
            "stop < entry < target",
        ),
        SignalDirection::Sell => (
            take_profit < entry_price && entry_price < stop_loss,
            "target < entry < stop",
        ),
    };

    if !ok {
        return Err(SignalError::InvalidLevels {
            direction,
            expected,
            entry: entry_price,
            stop_loss,
            take_profit,
        });
    }

    Ok(())
}
