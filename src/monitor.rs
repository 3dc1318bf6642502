//! Monitor: the polling loop that keeps signals and executions in step with price.
//!
//! Each tick:
//! - Fetches the latest quote and records it
//! - Settles active signals whose stop or target was touched
//! - Auto-trades signals that have not been fanned out yet
//! - Closes open executions at their stop/target and credits the P&L

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::api::{Broker, PriceFeed, Quote};
use crate::db::Database;
use crate::models::{Execution, SignalDirection, SignalStatus};
use crate::trading::{
    classify, evaluate, pnl, settle_price, AutoTradeReport, AutoTrader, PositionSizer,
    TradingConfig,
};

/// Monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Seconds between ticks
    pub poll_interval_secs: u64,

    pub trading_config: TradingConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 15,
            trading_config: TradingConfig::default(),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub price: Decimal,
    pub signals_settled: usize,
    pub auto_trade: AutoTradeReport,
    pub executions_closed: usize,
    pub realized_pnl: Decimal,
}

/// Running totals since the monitor started.
#[derive(Debug, Clone, Default)]
pub struct MonitorStats {
    pub ticks: u64,
    pub last_price: Option<Decimal>,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub signals_settled: usize,
    pub auto_trade: AutoTradeReport,
    pub executions_closed: usize,
    pub realized_pnl: Decimal,
}

impl std::fmt::Display for MonitorStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Monitor Statistics ===")?;
        writeln!(f, "Ticks:             {}", self.ticks)?;
        match self.last_price {
            Some(price) => writeln!(f, "Last Price:        {}", price)?,
            None => writeln!(f, "Last Price:        -")?,
        }
        writeln!(f, "Signals Settled:   {}", self.signals_settled)?;
        writeln!(f, "Auto-trade:        {}", self.auto_trade)?;
        writeln!(f, "Positions Closed:  {}", self.executions_closed)?;
        writeln!(f, "Realized P&L:      ${:.2}", self.realized_pnl)?;
        Ok(())
    }
}

/// Price monitor and auto-trade driver.
pub struct Monitor {
    config: MonitorConfig,
    db: Arc<Database>,
    feed: Arc<dyn PriceFeed>,
    auto_trader: AutoTrader,
    stats: Arc<RwLock<MonitorStats>>,
    shutdown: Arc<AtomicBool>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        db: Arc<Database>,
        feed: Arc<dyn PriceFeed>,
        broker: Arc<dyn Broker>,
    ) -> Self {
        let sizer = PositionSizer::new(config.trading_config.clone());
        let auto_trader = AutoTrader::new(db.clone(), broker, sizer);

        Self {
            config,
            db,
            feed,
            auto_trader,
            stats: Arc::new(RwLock::new(MonitorStats::default())),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn stats(&self) -> MonitorStats {
        self.stats.read().await.clone()
    }

    /// Tick until Ctrl+C.
    pub async fn run(&self) -> Result<()> {
        info!(
            symbol = %self.config.trading_config.symbol,
            poll_interval = self.config.poll_interval_secs,
            "Starting monitor loop"
        );

        let mut poll_interval = interval(Duration::from_secs(self.config.poll_interval_secs));

        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        while !self.shutdown.load(Ordering::SeqCst) {
            poll_interval.tick().await;
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            if let Err(e) = self.tick().await {
                error!(error = %e, "Error in monitor tick");
            }
        }

        info!("Monitor stopped");
        Ok(())
    }

    /// Single iteration of the loop.
    pub async fn tick(&self) -> Result<TickReport> {
        let symbol = &self.config.trading_config.symbol;
        let quote = self
            .feed
            .latest(symbol)
            .await
            .context("Failed to fetch quote")?;
        self.db.record_tick(&quote).await?;

        let price = quote.mid();
        debug!(symbol = %symbol, bid = %quote.bid, ask = %quote.ask, spread = %quote.spread(), "Monitor tick");

        let mut report = TickReport {
            price,
            ..Default::default()
        };

        // 1. Settle signals whose levels were reached
        report.signals_settled = self.settle_signals(price).await?;

        // 2. Fan out signals not yet auto-traded
        for signal in self.db.get_signals_pending_auto_trade().await? {
            match self.auto_trader.execute_signal(&signal).await {
                Ok(result) => {
                    report.auto_trade.merge(&result);
                    self.db.mark_auto_traded(&signal.id).await?;
                }
                Err(e) => warn!(signal = %signal.id, error = %e, "Auto-trade pass failed"),
            }
        }

        // 3. Close positions at their stop/target
        let (closed, realized) = self.close_executions(&quote).await?;
        report.executions_closed = closed;
        report.realized_pnl = realized;

        let mut stats = self.stats.write().await;
        stats.ticks += 1;
        stats.last_price = Some(price);
        stats.last_tick_at = Some(Utc::now());
        stats.signals_settled += report.signals_settled;
        stats.auto_trade.merge(&report.auto_trade);
        stats.executions_closed += report.executions_closed;
        stats.realized_pnl += report.realized_pnl;

        Ok(report)
    }

    async fn settle_signals(&self, price: Decimal) -> Result<usize> {
        let now = Utc::now();
        let mut settled = 0;

        for signal in self.db.get_active_signals().await? {
            let eval = evaluate(&signal, price, &self.config.trading_config);
            if !eval.transitioned {
                continue;
            }

            if self
                .db
                .settle_signal(&signal.id, eval.status, eval.mark_price, now)
                .await?
            {
                settled += 1;
                info!(
                    signal = %signal.id,
                    direction = %signal.direction,
                    status = %eval.status,
                    close = %eval.mark_price,
                    pips = %eval.pips,
                    "Signal settled"
                );
            }
        }

        Ok(settled)
    }

    async fn close_executions(&self, quote: &Quote) -> Result<(usize, Decimal)> {
        let now = Utc::now();
        let mut closed = 0;
        let mut realized = Decimal::ZERO;

        for exec in self.db.get_open_executions().await? {
            let exit_price = exit_price(quote, exec.direction);

            let Some((close_price, reason)) = self.exit_for(&exec, exit_price).await? else {
                continue;
            };

            let pnl = pnl(
                exec.direction,
                exec.entry_price,
                close_price,
                exec.lots,
                &self.config.trading_config,
            );

            if self
                .db
                .close_execution(&exec.id, &exec.account_id, close_price, pnl, reason, now)
                .await?
            {
                closed += 1;
                realized += pnl;
                info!(
                    execution = %exec.id,
                    account = %exec.account_id,
                    reason = reason,
                    close = %close_price,
                    pnl = %pnl,
                    "Position closed"
                );
            }
        }

        Ok((closed, realized))
    }

    /// Close price and reason if `exec` should close at `exit_price`.
    async fn exit_for(
        &self,
        exec: &Execution,
        exit_price: Decimal,
    ) -> Result<Option<(Decimal, &'static str)>> {
        let status = classify(exec.direction, exec.stop_loss, exec.take_profit, exit_price);
        if status.is_terminal() {
            let reason = if status == SignalStatus::HitTarget {
                "take profit"
            } else {
                "stop loss"
            };
            let close = settle_price(status, exec.stop_loss, exec.take_profit, exit_price);
            return Ok(Some((close, reason)));
        }

        // Positions follow their signal when it is closed or cancelled by hand
        let signal_status = self
            .db
            .get_signal(&exec.signal_id)
            .await?
            .map(|s| s.status);
        match signal_status {
            Some(SignalStatus::Closed) => Ok(Some((exit_price, "signal closed"))),
            Some(SignalStatus::Cancelled) => Ok(Some((exit_price, "signal cancelled"))),
            _ => Ok(None),
        }
    }
}

/// Price an open position exits at: longs sell at bid, shorts buy at ask.
fn exit_price(quote: &Quote, direction: SignalDirection) -> Decimal {
    match direction {
        SignalDirection::Buy => quote.bid,
        SignalDirection::Sell => quote.ask,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{SimulatedBroker, StaticPriceFeed};
    use crate::models::{ExecutionStatus, Signal, Subscription, SubscriptionTier, TradingAccount};
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;

    struct Harness {
        db: Arc<Database>,
        feed: Arc<StaticPriceFeed>,
        monitor: Monitor,
        account: TradingAccount,
    }

    async fn harness(price: Decimal) -> Harness {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let feed = Arc::new(StaticPriceFeed::at("XAUUSD", price));
        let config = MonitorConfig::default();
        let broker = Arc::new(SimulatedBroker::new(feed.clone(), config.trading_config.clone()));
        let monitor = Monitor::new(config, db.clone(), feed.clone(), broker);

        db.upsert_subscription(&Subscription {
            user_id: "vip".to_string(),
            tier: SubscriptionTier::Vip,
            started_at: Utc::now(),
            expires_at: Some(Utc::now() + ChronoDuration::days(30)),
        })
        .await
        .unwrap();
        let account = TradingAccount::new("vip", "demo", dec!(10000)).with_auto_trade(true);
        db.insert_account(&account).await.unwrap();

        Harness {
            db,
            feed,
            monitor,
            account,
        }
    }

    fn buy_signal() -> Signal {
        Signal::new("XAUUSD", SignalDirection::Buy, dec!(2350), dec!(2340), dec!(2370)).unwrap()
    }

    #[tokio::test]
    async fn test_tick_trades_then_settles_at_target() {
        let h = harness(dec!(2350)).await;
        let signal = buy_signal();
        h.db.insert_signal(&signal).await.unwrap();

        let report = h.monitor.tick().await.unwrap();
        assert_eq!(report.auto_trade.placed, 1);
        assert_eq!(report.signals_settled, 0);
        assert!(h.db.get_signals_pending_auto_trade().await.unwrap().is_empty());

        // Overshoot the target; both settle at the level
        h.feed.set_price(dec!(2372.4)).await;
        let report = h.monitor.tick().await.unwrap();
        assert_eq!(report.signals_settled, 1);
        assert_eq!(report.executions_closed, 1);

        let settled = h.db.get_signal(&signal.id).await.unwrap().unwrap();
        assert_eq!(settled.status, SignalStatus::HitTarget);
        assert_eq!(settled.close_price, Some(dec!(2370)));

        // 0.09 lots filled at 2350.15, closed at 2370: 198.5 pips * $10 * 0.09
        let account = h.db.get_account(&h.account.id).await.unwrap().unwrap();
        assert_eq!(account.balance, dec!(10178.65));
        assert_eq!(report.realized_pnl, dec!(178.65));

        let stats = h.monitor.stats().await;
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.executions_closed, 1);
    }

    #[tokio::test]
    async fn test_stop_loss_debits_account() {
        let h = harness(dec!(2350)).await;
        h.db.insert_signal(&buy_signal()).await.unwrap();
        h.monitor.tick().await.unwrap();

        h.feed.set_price(dec!(2339)).await;
        let report = h.monitor.tick().await.unwrap();
        assert_eq!(report.executions_closed, 1);

        // Entry 2350.15 to stop 2340 is 101.5 pips at 0.09 lots, under the 1% risked
        let account = h.db.get_account(&h.account.id).await.unwrap().unwrap();
        assert_eq!(account.balance, dec!(9908.65));
        assert!(dec!(10000) - account.balance <= dec!(100));

        // Further ticks change nothing
        h.feed.set_price(dec!(2380)).await;
        let report = h.monitor.tick().await.unwrap();
        assert_eq!(report.signals_settled, 0);
        assert_eq!(report.executions_closed, 0);
    }

    #[tokio::test]
    async fn test_manual_close_closes_positions_at_market() {
        let h = harness(dec!(2350)).await;
        let signal = buy_signal();
        h.db.insert_signal(&signal).await.unwrap();
        h.monitor.tick().await.unwrap();

        h.db
            .settle_signal(&signal.id, SignalStatus::Closed, dec!(2355), Utc::now())
            .await
            .unwrap();
        h.feed.set_price(dec!(2355)).await;
        let report = h.monitor.tick().await.unwrap();
        assert_eq!(report.executions_closed, 1);

        let execs = h.db.list_executions(Some(&h.account.id)).await.unwrap();
        assert_eq!(execs[0].status, ExecutionStatus::Closed);
        assert_eq!(execs[0].reason, "signal closed");
        assert_eq!(execs[0].close_price, Some(dec!(2355)));
    }
}
