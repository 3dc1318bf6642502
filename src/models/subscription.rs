//! Subscription tiers and a user's current subscription.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription level. Ordered so that `Vip > Premium > Free`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Premium,
    Vip,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Premium => "premium",
            SubscriptionTier::Vip => "vip",
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "premium" | "pro" => Ok(Self::Premium),
            "vip" => Ok(Self::Vip),
            other => bail!("unknown tier: {}", other),
        }
    }
}

/// A user's paid subscription. Payment itself happens elsewhere; this only
/// records the outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: String,
    pub tier: SubscriptionTier,
    pub started_at: DateTime<Utc>,

    /// `None` means the subscription does not lapse
    pub expires_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Free subscription for a user with no record.
    pub fn free(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tier: SubscriptionTier::Free,
            started_at: Utc::now(),
            expires_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// Tier that applies right now; a lapsed subscription counts as free.
    pub fn effective_tier(&self, now: DateTime<Utc>) -> SubscriptionTier {
        if self.is_expired(now) {
            SubscriptionTier::Free
        } else {
            self.tier
        }
    }
}
