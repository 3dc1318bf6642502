//! Subscription tier gating: what each tier may see and do.
//!
//! - Free: sees settled signals from the last week; active signals are
//!   listed but their levels stay locked.
//! - Premium: live levels for signals published at premium or below,
//!   90 days of history, one connected account (manual trading only).
//! - VIP: everything, including auto-trade on up to five accounts.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Signal, SignalDirection, SignalStatus, SubscriptionTier};

/// A gated capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    LiveSignals,
    ConnectAccount,
    AutoTrade,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::LiveSignals => "live signals",
            Feature::ConnectAccount => "connected trading accounts",
            Feature::AutoTrade => "auto-trade",
        }
    }
}

/// Limits for one tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierPolicy {
    pub tier: SubscriptionTier,

    /// Sees entry/SL/TP of active signals
    pub live_signals: bool,

    /// How far back settled signals are visible; `None` = unlimited
    pub history_days: Option<i64>,

    pub auto_trade: bool,

    /// Trading accounts the user may connect
    pub max_accounts: usize,
}

impl TierPolicy {
    pub fn for_tier(tier: SubscriptionTier) -> Self {
        match tier {
            SubscriptionTier::Free => Self {
                tier,
                live_signals: false,
                history_days: Some(7),
                auto_trade: false,
                max_accounts: 0,
            },
            SubscriptionTier::Premium => Self {
                tier,
                live_signals: true,
                history_days: Some(90),
                auto_trade: false,
                max_accounts: 1,
            },
            SubscriptionTier::Vip => Self {
                tier,
                live_signals: true,
                history_days: None,
                auto_trade: true,
                max_accounts: 5,
            },
        }
    }

    pub fn allows(&self, feature: Feature) -> bool {
        match feature {
            Feature::LiveSignals => self.live_signals,
            Feature::ConnectAccount => self.max_accounts > 0,
            Feature::AutoTrade => self.auto_trade,
        }
    }

    /// Whether a signal settled at `closed_at` is inside the history window.
    pub fn in_history_window(&self, closed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.history_days {
            Some(days) => now - closed_at <= Duration::days(days),
            None => true,
        }
    }
}

/// Lowest tier that grants a feature.
pub fn required_tier(feature: Feature) -> SubscriptionTier {
    [
        SubscriptionTier::Free,
        SubscriptionTier::Premium,
        SubscriptionTier::Vip,
    ]
    .into_iter()
    .find(|t| TierPolicy::for_tier(*t).allows(feature))
    .unwrap_or(SubscriptionTier::Vip)
}

/// Error unless `tier` grants `feature`.
pub fn check_feature(tier: SubscriptionTier, feature: Feature) -> anyhow::Result<()> {
    if TierPolicy::for_tier(tier).allows(feature) {
        return Ok(());
    }
    anyhow::bail!(
        "{} requires the {} tier (current: {})",
        feature.as_str(),
        required_tier(feature),
        tier
    )
}

/// A signal as shown to a particular tier. Locked signals carry no levels.
#[derive(Debug, Clone, Serialize)]
pub struct SignalView {
    pub id: String,
    pub symbol: String,
    pub direction: SignalDirection,
    pub status: SignalStatus,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub locked: bool,
    pub entry_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub close_price: Option<Decimal>,
}

/// Whether a signal appears at all for this tier.
pub fn can_view(signal: &Signal, tier: SubscriptionTier, now: DateTime<Utc>) -> bool {
    if signal.is_active() {
        return true;
    }
    let policy = TierPolicy::for_tier(tier);
    let settled_at = signal.closed_at.unwrap_or(signal.created_at);
    policy.in_history_window(settled_at, now)
}

/// Whether the live levels of an active signal are hidden from this tier.
pub fn is_locked(signal: &Signal, tier: SubscriptionTier) -> bool {
    if !signal.is_active() {
        return false;
    }
    !TierPolicy::for_tier(tier).live_signals || tier < signal.min_tier
}

/// Build the view of `signal` for `tier`, or `None` if it is out of reach.
pub fn redact(signal: &Signal, tier: SubscriptionTier, now: DateTime<Utc>) -> Option<SignalView> {
    if !can_view(signal, tier, now) {
        return None;
    }

    let locked = is_locked(signal, tier);
    let reveal = |v: Decimal| if locked { None } else { Some(v) };

    Some(SignalView {
        id: signal.id.clone(),
        symbol: signal.symbol.clone(),
        direction: signal.direction,
        status: signal.status,
        created_at: signal.created_at,
        closed_at: signal.closed_at,
        locked,
        entry_price: reveal(signal.entry_price),
        stop_loss: reveal(signal.stop_loss),
        take_profit: reveal(signal.take_profit),
        close_price: signal.close_price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn active_signal() -> Signal {
        Signal::new("XAUUSD", SignalDirection::Buy, dec!(2350), dec!(2340), dec!(2370)).unwrap()
    }

    fn settled_signal(days_ago: i64) -> Signal {
        let mut s = active_signal();
        let at = Utc::now() - Duration::days(days_ago);
        s.created_at = at - Duration::hours(3);
        s.settle(SignalStatus::HitTarget, dec!(2370), at).unwrap();
        s
    }

    #[test]
    fn test_free_tier_sees_active_signal_locked() {
        let view = redact(&active_signal(), SubscriptionTier::Free, Utc::now()).unwrap();
        assert!(view.locked);
        assert_eq!(view.entry_price, None);
        assert_eq!(view.take_profit, None);
        assert_eq!(view.direction, SignalDirection::Buy);
    }

    #[test]
    fn test_premium_sees_live_levels() {
        let view = redact(&active_signal(), SubscriptionTier::Premium, Utc::now()).unwrap();
        assert!(!view.locked);
        assert_eq!(view.entry_price, Some(dec!(2350)));
    }

    #[test]
    fn test_vip_only_signal_locked_for_premium() {
        let signal = active_signal().with_min_tier(SubscriptionTier::Vip);
        assert!(is_locked(&signal, SubscriptionTier::Premium));
        assert!(!is_locked(&signal, SubscriptionTier::Vip));
    }

    #[test]
    fn test_history_window() {
        let now = Utc::now();
        let recent = settled_signal(3);
        let old = settled_signal(30);
        let ancient = settled_signal(400);

        // Settled signals are never locked, only windowed
        let view = redact(&recent, SubscriptionTier::Free, now).unwrap();
        assert!(!view.locked);
        assert_eq!(view.close_price, Some(dec!(2370)));

        assert!(redact(&old, SubscriptionTier::Free, now).is_none());
        assert!(redact(&old, SubscriptionTier::Premium, now).is_some());
        assert!(redact(&ancient, SubscriptionTier::Premium, now).is_none());
        assert!(redact(&ancient, SubscriptionTier::Vip, now).is_some());
    }

    #[test]
    fn test_feature_checks() {
        assert!(check_feature(SubscriptionTier::Vip, Feature::AutoTrade).is_ok());

        let err = check_feature(SubscriptionTier::Premium, Feature::AutoTrade).unwrap_err();
        assert!(err.to_string().contains("vip"));

        assert!(check_feature(SubscriptionTier::Free, Feature::ConnectAccount).is_err());
        assert_eq!(required_tier(Feature::ConnectAccount), SubscriptionTier::Premium);
        assert_eq!(required_tier(Feature::LiveSignals), SubscriptionTier::Premium);
    }
}
