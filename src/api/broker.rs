//! Broker interface and the simulated broker used for connected demo accounts.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::info;

use crate::models::TradingAccount;
use crate::trading::TradingConfig;

use super::price_feed::PriceFeed;
use super::types::{OrderFill, OrderRequest, Quote};

/// Order execution backend.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Balance the broker reports for the account.
    async fn account_balance(&self, account: &TradingAccount) -> Result<Decimal>;

    /// Dealing quote a market order for `symbol` would fill against now.
    async fn quote(&self, symbol: &str) -> Result<Quote>;

    /// Fill a market order immediately or fail.
    async fn place_market_order(
        &self,
        account: &TradingAccount,
        order: &OrderRequest,
    ) -> Result<OrderFill>;
}

/// Broker that fills orders against the current feed quote.
///
/// Feeds that report no spread get the configured simulated spread,
/// split evenly around the mid.
pub struct SimulatedBroker {
    feed: Arc<dyn PriceFeed>,
    config: TradingConfig,
}

impl SimulatedBroker {
    pub fn new(feed: Arc<dyn PriceFeed>, config: TradingConfig) -> Self {
        Self { feed, config }
    }

    /// Quote with the simulated spread applied if the feed has none.
    fn widen(&self, quote: Quote) -> Quote {
        if quote.ask > quote.bid {
            return quote;
        }
        let half = self.config.spread / dec!(2);
        let mid = quote.mid();
        Quote {
            bid: mid - half,
            ask: mid + half,
            ..quote
        }
    }

    fn check_lots(&self, lots: Decimal) -> Result<()> {
        if lots < self.config.min_lot || lots > self.config.max_lot {
            bail!(
                "Lot size {} outside [{}, {}]",
                lots,
                self.config.min_lot,
                self.config.max_lot
            );
        }
        if !(lots % self.config.lot_step).is_zero() {
            bail!("Lot size {} is not a multiple of {}", lots, self.config.lot_step);
        }
        Ok(())
    }
}

#[async_trait]
impl Broker for SimulatedBroker {
    async fn account_balance(&self, account: &TradingAccount) -> Result<Decimal> {
        if !account.connected {
            bail!("Account {} is not connected", account.id);
        }
        Ok(account.balance)
    }

    async fn quote(&self, symbol: &str) -> Result<Quote> {
        Ok(self.widen(self.feed.latest(symbol).await?))
    }

    async fn place_market_order(
        &self,
        account: &TradingAccount,
        order: &OrderRequest,
    ) -> Result<OrderFill> {
        if !account.connected {
            bail!("Account {} is not connected", account.id);
        }
        if order.symbol != self.config.symbol {
            bail!("Symbol {} not tradeable", order.symbol);
        }
        self.check_lots(order.lots)?;

        let quote = self.quote(&order.symbol).await?;
        let fill_price = quote.fill_price(order.direction);

        let fill = OrderFill {
            order_id: uuid::Uuid::new_v4().to_string(),
            fill_price,
            lots: order.lots,
            filled_at: Utc::now(),
        };

        info!(
            account = %account.id,
            order_id = %fill.order_id,
            side = %order.direction,
            lots = %fill.lots,
            price = %fill.fill_price,
            "[SIM] Order filled"
        );

        Ok(fill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::StaticPriceFeed;
    use crate::models::SignalDirection;

    fn broker(price: Decimal) -> SimulatedBroker {
        let feed = Arc::new(StaticPriceFeed::at("XAUUSD", price));
        SimulatedBroker::new(feed, TradingConfig::default())
    }

    fn order(direction: SignalDirection, lots: Decimal) -> OrderRequest {
        OrderRequest {
            account_id: "acc".to_string(),
            symbol: "XAUUSD".to_string(),
            direction,
            lots,
            stop_loss: dec!(2340),
            take_profit: dec!(2370),
            client_ref: "sig".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fills_with_simulated_spread() {
        let broker = broker(dec!(2350));
        let account = TradingAccount::new("u1", "demo", dec!(10000));

        let fill = broker
            .place_market_order(&account, &order(SignalDirection::Buy, dec!(0.1)))
            .await
            .unwrap();
        assert_eq!(fill.fill_price, dec!(2350.15));
        assert_eq!(fill.lots, dec!(0.1));

        let fill = broker
            .place_market_order(&account, &order(SignalDirection::Sell, dec!(0.1)))
            .await
            .unwrap();
        assert_eq!(fill.fill_price, dec!(2349.85));
    }

    #[tokio::test]
    async fn test_quote_matches_fills() {
        let broker = broker(dec!(2350));
        let account = TradingAccount::new("u1", "demo", dec!(10000));

        let quote = broker.quote("XAUUSD").await.unwrap();
        assert_eq!(quote.spread(), dec!(0.30));

        let fill = broker
            .place_market_order(&account, &order(SignalDirection::Buy, dec!(0.1)))
            .await
            .unwrap();
        assert_eq!(fill.fill_price, quote.fill_price(SignalDirection::Buy));
    }

    #[tokio::test]
    async fn test_rejects_bad_orders() {
        let broker = broker(dec!(2350));
        let mut account = TradingAccount::new("u1", "demo", dec!(10000));

        // Not a multiple of the lot step
        assert!(broker
            .place_market_order(&account, &order(SignalDirection::Buy, dec!(0.015)))
            .await
            .is_err());

        // Above max lot
        assert!(broker
            .place_market_order(&account, &order(SignalDirection::Buy, dec!(51)))
            .await
            .is_err());

        account.connected = false;
        assert!(broker
            .place_market_order(&account, &order(SignalDirection::Buy, dec!(0.1)))
            .await
            .is_err());
        assert!(broker.account_balance(&account).await.is_err());
    }
}
