//! Auto-trade: executes a newly published signal on every eligible account.
//!
//! Each (signal, account) pair is attempted at most once. Orders for
//! different accounts go out concurrently, and each result is recorded as
//! an execution as soon as its order completes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::api::{Broker, OrderRequest};
use crate::db::Database;
use crate::models::{
    Execution, ExecutionStatus, Signal, SignalDirection, SubscriptionTier, TradingAccount,
};
use crate::subscription::{Feature, TierPolicy};

use super::{ClampReason, PositionSizer};

/// Outcome counts of one auto-trade pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoTradeReport {
    pub placed: usize,
    pub skipped: usize,
    pub failed: usize,

    /// Accounts that already had an execution for the signal
    pub already_done: usize,
}

impl AutoTradeReport {
    fn record(&mut self, status: ExecutionStatus) {
        match status {
            ExecutionStatus::Open | ExecutionStatus::Closed => self.placed += 1,
            ExecutionStatus::Skipped => self.skipped += 1,
            ExecutionStatus::Failed => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: &AutoTradeReport) {
        self.placed += other.placed;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.already_done += other.already_done;
    }
}

impl fmt::Display for AutoTradeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "placed {} | skipped {} | failed {} | already done {}",
            self.placed, self.skipped, self.failed, self.already_done
        )
    }
}

/// Fans a signal out to connected auto-trade accounts.
pub struct AutoTrader {
    db: Arc<Database>,
    broker: Arc<dyn Broker>,
    sizer: PositionSizer,
}

impl AutoTrader {
    pub fn new(db: Arc<Database>, broker: Arc<dyn Broker>, sizer: PositionSizer) -> Self {
        Self { db, broker, sizer }
    }

    /// Execute `signal` on every connected account that has auto-trade on.
    pub async fn execute_signal(&self, signal: &Signal) -> Result<AutoTradeReport> {
        let mut report = AutoTradeReport::default();

        if !signal.is_active() {
            debug!(signal = %signal.id, status = %signal.status, "Signal not active, nothing to auto-trade");
            return Ok(report);
        }

        let now = Utc::now();
        let mut tiers: HashMap<String, SubscriptionTier> = HashMap::new();
        let mut pending = Vec::new();

        for account in self.db.get_auto_trade_accounts().await? {
            if self.db.has_execution(&signal.id, &account.id).await? {
                report.already_done += 1;
                continue;
            }

            let tier = match tiers.get(&account.user_id) {
                Some(tier) => *tier,
                None => {
                    let tier = self
                        .db
                        .get_subscription(&account.user_id)
                        .await?
                        .effective_tier(now);
                    tiers.insert(account.user_id.clone(), tier);
                    tier
                }
            };

            pending.push((account, tier));
        }

        let attempts = pending
            .iter()
            .map(|(account, tier)| self.attempt_and_record(signal, account, *tier));

        for (exec, recorded) in join_all(attempts).await {
            match recorded {
                Ok(true) => report.record(exec.status),
                Ok(false) => {
                    // Another pass recorded this pair first
                    report.already_done += 1;
                }
                Err(e) => {
                    error!(
                        signal = %signal.id,
                        account = %exec.account_id,
                        status = %exec.status,
                        order_id = exec.order_id.as_deref().unwrap_or("-"),
                        error = %e,
                        "Failed to record execution"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            signal = %signal.id,
            placed = report.placed,
            skipped = report.skipped,
            failed = report.failed,
            "Auto-trade pass complete"
        );

        Ok(report)
    }

    async fn attempt_and_record(
        &self,
        signal: &Signal,
        account: &TradingAccount,
        tier: SubscriptionTier,
    ) -> (Execution, Result<bool>) {
        let exec = self.attempt(signal, account, tier).await;
        let recorded = self.db.insert_execution(&exec).await;
        (exec, recorded)
    }

    /// Try one account. Never errors: problems become skipped or failed records.
    async fn attempt(
        &self,
        signal: &Signal,
        account: &TradingAccount,
        tier: SubscriptionTier,
    ) -> Execution {
        let skip = |reason: String| {
            warn!(signal = %signal.id, account = %account.id, reason = %reason, "Auto-trade skipped");
            Execution::skipped(&signal.id, &account.id, signal.direction, reason)
        };

        if !TierPolicy::for_tier(tier).allows(Feature::AutoTrade) {
            return skip(format!("{} tier does not include auto-trade", tier));
        }
        if !account.accepts_auto_trade() {
            return skip("account not connected or auto-trade off".to_string());
        }

        let balance = match self.broker.account_balance(account).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(account = %account.id, error = %e, "Balance lookup failed");
                return Execution::failed(&signal.id, &account.id, signal.direction, e.to_string());
            }
        };

        // Size on the price the order will actually fill at, not the published entry
        let quote = match self.broker.quote(&signal.symbol).await {
            Ok(quote) => quote,
            Err(e) => {
                warn!(signal = %signal.id, error = %e, "Quote lookup failed");
                return Execution::failed(&signal.id, &account.id, signal.direction, e.to_string());
            }
        };
        let expected_fill = quote.fill_price(signal.direction);

        let past_stop = match signal.direction {
            SignalDirection::Buy => expected_fill <= signal.stop_loss,
            SignalDirection::Sell => expected_fill >= signal.stop_loss,
        };
        if past_stop {
            return skip(format!(
                "market {} already beyond stop {}",
                expected_fill, signal.stop_loss
            ));
        }

        let size = match self.sizer.calculate(
            balance,
            account.risk_pct,
            expected_fill,
            signal.stop_loss,
        ) {
            Ok(size) => size,
            Err(e) => return skip(e.to_string()),
        };

        let actual_pct = size.actual_risk_pct(balance);
        if actual_pct > self.sizer.config().max_risk_pct {
            let what = match size.clamped {
                ClampReason::RaisedToMin => "minimum lot",
                _ => "order",
            };
            return skip(format!(
                "{} would risk {}% of balance",
                what,
                actual_pct.round_dp(2)
            ));
        }

        let order = OrderRequest {
            account_id: account.id.clone(),
            symbol: signal.symbol.clone(),
            direction: signal.direction,
            lots: size.lots,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            client_ref: signal.id.clone(),
        };

        match self.broker.place_market_order(account, &order).await {
            Ok(fill) => {
                info!(
                    signal = %signal.id,
                    account = %account.display_name(),
                    lots = %fill.lots,
                    price = %fill.fill_price,
                    risk = %size.actual_risk.round_dp(2),
                    "Auto-trade order placed"
                );
                Execution::opened(signal, &account.id, fill.lots, fill.fill_price, fill.order_id)
            }
            Err(e) => {
                error!(signal = %signal.id, account = %account.id, error = %e, "Auto-trade order failed");
                Execution::failed(&signal.id, &account.id, signal.direction, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{OrderFill, Quote, SimulatedBroker, StaticPriceFeed};
    use crate::models::{SignalDirection, Subscription};
    use crate::trading::TradingConfig;
    use async_trait::async_trait;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct RejectingBroker;

    #[async_trait]
    impl Broker for RejectingBroker {
        async fn account_balance(&self, account: &TradingAccount) -> Result<Decimal> {
            Ok(account.balance)
        }

        async fn quote(&self, symbol: &str) -> Result<Quote> {
            Ok(Quote::flat(symbol, dec!(2350)))
        }

        async fn place_market_order(
            &self,
            _account: &TradingAccount,
            _order: &OrderRequest,
        ) -> Result<OrderFill> {
            anyhow::bail!("market closed")
        }
    }

    /// Fills the order, then loses the database before it can be recorded.
    struct ClosingBroker {
        inner: SimulatedBroker,
        db: Arc<Database>,
    }

    #[async_trait]
    impl Broker for ClosingBroker {
        async fn account_balance(&self, account: &TradingAccount) -> Result<Decimal> {
            self.inner.account_balance(account).await
        }

        async fn quote(&self, symbol: &str) -> Result<Quote> {
            self.inner.quote(symbol).await
        }

        async fn place_market_order(
            &self,
            account: &TradingAccount,
            order: &OrderRequest,
        ) -> Result<OrderFill> {
            let fill = self.inner.place_market_order(account, order).await?;
            self.db.close().await;
            Ok(fill)
        }
    }

    async fn setup() -> (Arc<Database>, Signal) {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let signal =
            Signal::new("XAUUSD", SignalDirection::Buy, dec!(2350), dec!(2340), dec!(2370)).unwrap();
        db.insert_signal(&signal).await.unwrap();
        (db, signal)
    }

    async fn subscribe(db: &Database, user: &str, tier: SubscriptionTier) {
        db.upsert_subscription(&Subscription {
            user_id: user.to_string(),
            tier,
            started_at: Utc::now(),
            expires_at: Some(Utc::now() + Duration::days(30)),
        })
        .await
        .unwrap();
    }

    async fn add_account(db: &Database, user: &str, balance: Decimal) -> TradingAccount {
        let account = TradingAccount::new(user, "", balance).with_auto_trade(true);
        db.insert_account(&account).await.unwrap();
        account
    }

    fn simulated_broker(price: Decimal) -> SimulatedBroker {
        let feed = Arc::new(StaticPriceFeed::at("XAUUSD", price));
        SimulatedBroker::new(feed, TradingConfig::default())
    }

    fn simulated(price: Decimal) -> Arc<dyn Broker> {
        Arc::new(simulated_broker(price))
    }

    fn sizer() -> PositionSizer {
        PositionSizer::new(TradingConfig::default())
    }

    #[tokio::test]
    async fn test_vip_account_gets_sized_order() {
        let (db, signal) = setup().await;
        subscribe(&db, "vip", SubscriptionTier::Vip).await;
        let account = add_account(&db, "vip", dec!(10000)).await;

        let trader = AutoTrader::new(db.clone(), simulated(dec!(2350)), sizer());
        let report = trader.execute_signal(&signal).await.unwrap();
        assert_eq!(report.placed, 1);

        let execs = db.list_executions(Some(&account.id)).await.unwrap();
        assert_eq!(execs.len(), 1);
        // $100 over 101.5 pips from the ask at $10/pip/lot = 0.0985, floored
        assert_eq!(execs[0].lots, dec!(0.09));
        assert_eq!(execs[0].entry_price, dec!(2350.15));
        assert!(execs[0].is_open());
    }

    #[tokio::test]
    async fn test_sizes_on_fill_after_market_moved() {
        let (db, signal) = setup().await;
        subscribe(&db, "vip", SubscriptionTier::Vip).await;
        let account = TradingAccount::new("vip", "", dec!(10000))
            .with_risk_pct(dec!(5))
            .with_auto_trade(true);
        db.insert_account(&account).await.unwrap();

        // Price ran most of the way to the 2370 target before the pass
        let trader = AutoTrader::new(db.clone(), simulated(dec!(2369.5)), sizer());
        let report = trader.execute_signal(&signal).await.unwrap();
        assert_eq!(report.placed, 1);

        let exec = &db.list_executions(Some(&account.id)).await.unwrap()[0];
        assert_eq!(exec.entry_price, dec!(2369.65));
        // $500 over 296.5 pips = 0.1686 -> 0.16
        assert_eq!(exec.lots, dec!(0.16));

        let loss_at_stop = (exec.entry_price - exec.stop_loss) / dec!(0.1) * dec!(10) * exec.lots;
        assert_eq!(loss_at_stop, dec!(474.4));
        assert!(loss_at_stop <= dec!(500));
    }

    #[tokio::test]
    async fn test_market_beyond_stop_is_skipped() {
        let (db, signal) = setup().await;
        subscribe(&db, "vip", SubscriptionTier::Vip).await;
        let account = add_account(&db, "vip", dec!(10000)).await;

        let trader = AutoTrader::new(db.clone(), simulated(dec!(2339)), sizer());
        let report = trader.execute_signal(&signal).await.unwrap();
        assert_eq!(report.skipped, 1);

        let execs = db.list_executions(Some(&account.id)).await.unwrap();
        assert!(execs[0].reason.contains("beyond stop"));
    }

    #[tokio::test]
    async fn test_ineligible_accounts_are_skipped() {
        let (db, signal) = setup().await;
        subscribe(&db, "premium", SubscriptionTier::Premium).await;
        subscribe(&db, "small", SubscriptionTier::Vip).await;
        add_account(&db, "premium", dec!(10000)).await;
        // Min lot on a $50 account risks 20%
        add_account(&db, "small", dec!(50)).await;

        let trader = AutoTrader::new(db.clone(), simulated(dec!(2350)), sizer());
        let report = trader.execute_signal(&signal).await.unwrap();
        assert_eq!(report.placed, 0);
        assert_eq!(report.skipped, 2);
        assert_eq!(db.get_execution_counts().await.unwrap().skipped, 2);
    }

    #[tokio::test]
    async fn test_expired_vip_is_treated_as_free() {
        let (db, signal) = setup().await;
        db.upsert_subscription(&Subscription {
            user_id: "lapsed".to_string(),
            tier: SubscriptionTier::Vip,
            started_at: Utc::now() - Duration::days(60),
            expires_at: Some(Utc::now() - Duration::days(1)),
        })
        .await
        .unwrap();
        add_account(&db, "lapsed", dec!(10000)).await;

        let trader = AutoTrader::new(db.clone(), simulated(dec!(2350)), sizer());
        let report = trader.execute_signal(&signal).await.unwrap();
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_broker_rejection_is_recorded_as_failed() {
        let (db, signal) = setup().await;
        subscribe(&db, "vip", SubscriptionTier::Vip).await;
        let account = add_account(&db, "vip", dec!(10000)).await;

        let trader = AutoTrader::new(db.clone(), Arc::new(RejectingBroker), sizer());
        let report = trader.execute_signal(&signal).await.unwrap();
        assert_eq!(report.failed, 1);

        let execs = db.list_executions(Some(&account.id)).await.unwrap();
        assert_eq!(execs[0].status, ExecutionStatus::Failed);
        assert!(execs[0].reason.contains("market closed"));
    }

    #[tokio::test]
    async fn test_second_pass_is_a_no_op() {
        let (db, signal) = setup().await;
        subscribe(&db, "vip", SubscriptionTier::Vip).await;
        add_account(&db, "vip", dec!(10000)).await;
        add_account(&db, "vip", dec!(20000)).await;

        let trader = AutoTrader::new(db.clone(), simulated(dec!(2350)), sizer());
        let first = trader.execute_signal(&signal).await.unwrap();
        assert_eq!(first.placed, 2);

        let second = trader.execute_signal(&signal).await.unwrap();
        assert_eq!(second.placed, 0);
        assert_eq!(second.already_done, 2);
        assert_eq!(db.get_execution_counts().await.unwrap().total(), 2);
    }

    #[tokio::test]
    async fn test_unrecorded_fill_is_reported_not_raised() {
        let (db, signal) = setup().await;
        subscribe(&db, "vip", SubscriptionTier::Vip).await;
        add_account(&db, "vip", dec!(10000)).await;

        let broker = ClosingBroker {
            inner: simulated_broker(dec!(2350)),
            db: db.clone(),
        };
        let trader = AutoTrader::new(db.clone(), Arc::new(broker), sizer());

        let report = trader.execute_signal(&signal).await.unwrap();
        assert_eq!(report.placed, 0);
        assert_eq!(report.failed, 1);
    }
}
