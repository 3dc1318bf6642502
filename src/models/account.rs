//! Simulated trading account a user connects for auto-execution.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// A simulated broker account owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingAccount {
    pub id: String,

    /// Owner (identity comes from the external auth provider)
    pub user_id: String,

    #[serde(default)]
    pub label: String,

    /// Cash balance in USD
    pub balance: Decimal,

    /// Percent of balance risked per auto-traded signal (1 = 1%)
    pub risk_pct: Decimal,

    /// Whether new signals are executed on this account automatically
    #[serde(default)]
    pub auto_trade: bool,

    /// Whether the account is currently linked
    #[serde(default = "default_true")]
    pub connected: bool,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl TradingAccount {
    /// Create a connected account with auto-trade switched off.
    pub fn new(user_id: impl Into<String>, label: impl Into<String>, balance: Decimal) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            label: label.into(),
            balance,
            risk_pct: dec!(1),
            auto_trade: false,
            connected: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_risk_pct(mut self, risk_pct: Decimal) -> Self {
        self.risk_pct = risk_pct;
        self
    }

    pub fn with_auto_trade(mut self, enabled: bool) -> Self {
        self.auto_trade = enabled;
        self
    }

    /// Label, falling back to a shortened id.
    pub fn display_name(&self) -> String {
        if !self.label.is_empty() {
            self.label.clone()
        } else if self.id.len() > 8 {
            format!("{}...", &self.id[..8])
        } else {
            self.id.clone()
        }
    }

    /// Dollar amount risked per signal at the configured percentage.
    pub fn risk_amount(&self) -> Decimal {
        self.balance * self.risk_pct / dec!(100)
    }

    /// Ready to receive auto-traded orders (tier checks happen elsewhere).
    pub fn accepts_auto_trade(&self) -> bool {
        self.connected && self.auto_trade
    }
}
