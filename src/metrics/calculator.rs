//! Performance statistics for the signal track record and for accounts.

use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::models::{Execution, ExecutionStatus, Signal, SignalStatus};
use crate::trading::{pips, TradingConfig};

/// Track record of published signals, measured in pips.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SignalStats {
    /// All signals considered, including active and cancelled
    pub total: u32,
    pub active: u32,
    pub cancelled: u32,

    /// Signals settled at a price (target, stop or manual close)
    pub settled: u32,
    pub wins: u32,
    pub losses: u32,
    pub manually_closed: u32,

    /// wins / settled
    pub win_rate: f64,

    pub total_pips: Decimal,
    pub avg_win_pips: Decimal,
    pub avg_loss_pips: Decimal,

    /// Gross winning pips / gross losing pips; `None` with no losses
    pub profit_factor: Option<f64>,

    /// Average pips per settled signal
    pub expectancy: Decimal,

    /// Largest peak-to-trough drop of cumulative pips, in close order
    pub max_drawdown_pips: Decimal,

    /// Sample standard deviation of per-signal pips
    pub pip_std_dev: Option<f64>,

    pub best_pips: Option<Decimal>,
    pub worst_pips: Option<Decimal>,
}

impl SignalStats {
    /// Compute statistics over `signals`.
    pub fn from_signals(signals: &[Signal], config: &TradingConfig) -> Self {
        let mut stats = SignalStats {
            total: signals.len() as u32,
            ..Default::default()
        };

        let mut settled: Vec<&Signal> = Vec::new();
        for signal in signals {
            match signal.status {
                SignalStatus::Active => stats.active += 1,
                SignalStatus::Cancelled => stats.cancelled += 1,
                SignalStatus::Closed => {
                    stats.manually_closed += 1;
                    settled.push(signal);
                }
                SignalStatus::HitTarget | SignalStatus::HitStop => settled.push(signal),
            }
        }

        // Drawdown follows the order signals closed in
        settled.sort_by_key(|s| s.closed_at.unwrap_or(s.created_at));

        let results: Vec<Decimal> = settled
            .iter()
            .filter_map(|s| {
                s.close_price
                    .map(|close| pips(s.direction, s.entry_price, close, config))
            })
            .collect();

        Self::calculate_pip_metrics(&mut stats, &results);
        stats
    }

    fn calculate_pip_metrics(stats: &mut SignalStats, results: &[Decimal]) {
        if results.is_empty() {
            return;
        }

        let wins: Vec<Decimal> = results.iter().copied().filter(|p| *p > Decimal::ZERO).collect();
        let losses: Vec<Decimal> = results.iter().copied().filter(|p| *p < Decimal::ZERO).collect();

        stats.settled = results.len() as u32;
        stats.wins = wins.len() as u32;
        stats.losses = losses.len() as u32;
        stats.total_pips = results.iter().copied().sum();
        stats.win_rate = wins.len() as f64 / results.len() as f64;

        let gross_win: Decimal = wins.iter().copied().sum();
        let gross_loss: Decimal = losses.iter().map(|l| l.abs()).sum();

        if !wins.is_empty() {
            stats.avg_win_pips = gross_win / Decimal::from(wins.len() as u32);
        }
        if !losses.is_empty() {
            stats.avg_loss_pips = gross_loss / Decimal::from(losses.len() as u32);
        }
        if gross_loss > Decimal::ZERO {
            stats.profit_factor =
                Some(gross_win.to_f64().unwrap_or(0.0) / gross_loss.to_f64().unwrap_or(1.0));
        }

        stats.expectancy = stats.total_pips / Decimal::from(results.len() as u32);
        stats.best_pips = results.iter().copied().max();
        stats.worst_pips = results.iter().copied().min();

        Self::calculate_drawdown(stats, results);

        if results.len() >= 2 {
            let values: Vec<f64> = results.iter().filter_map(|p| p.to_f64()).collect();
            let std_dev = values.std_dev();
            if std_dev.is_finite() {
                stats.pip_std_dev = Some(std_dev);
            }
        }
    }

    /// Maximum drawdown of the cumulative pip curve, starting from zero.
    fn calculate_drawdown(stats: &mut SignalStats, results: &[Decimal]) {
        let mut equity = Decimal::ZERO;
        let mut peak = Decimal::ZERO;
        let mut max_dd = Decimal::ZERO;

        for result in results {
            equity += result;
            if equity > peak {
                peak = equity;
            }
            let dd = peak - equity;
            if dd > max_dd {
                max_dd = dd;
            }
        }

        stats.max_drawdown_pips = max_dd;
    }
}

impl fmt::Display for SignalStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Signals:        {} ({} active, {} cancelled)", self.total, self.active, self.cancelled)?;
        writeln!(f, "Settled:        {} ({} closed manually)", self.settled, self.manually_closed)?;
        writeln!(f, "Wins/Losses:    {} / {}", self.wins, self.losses)?;
        writeln!(f, "Win rate:       {:.1}%", self.win_rate * 100.0)?;
        writeln!(f, "Total pips:     {}", self.total_pips.round_dp(1))?;
        writeln!(f, "Avg win:        {} pips", self.avg_win_pips.round_dp(1))?;
        writeln!(f, "Avg loss:       {} pips", self.avg_loss_pips.round_dp(1))?;
        match self.profit_factor {
            Some(pf) => writeln!(f, "Profit factor:  {:.2}", pf)?,
            None => writeln!(f, "Profit factor:  n/a")?,
        }
        writeln!(f, "Expectancy:     {} pips", self.expectancy.round_dp(1))?;
        writeln!(f, "Max drawdown:   {} pips", self.max_drawdown_pips.round_dp(1))?;
        if let Some(sd) = self.pip_std_dev {
            writeln!(f, "Pip std dev:    {:.1}", sd)?;
        }
        if let (Some(best), Some(worst)) = (self.best_pips, self.worst_pips) {
            write!(f, "Best/Worst:     {} / {} pips", best.round_dp(1), worst.round_dp(1))?;
        }
        Ok(())
    }
}

/// Auto-trade results for one account.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AccountStats {
    pub account_id: String,
    pub open: u32,
    pub closed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub wins: u32,
    pub losses: u32,

    /// wins / closed
    pub win_rate: f64,
    pub realized_pnl: Decimal,
}

impl AccountStats {
    pub fn from_executions(account_id: &str, executions: &[Execution]) -> Self {
        let mut stats = AccountStats {
            account_id: account_id.to_string(),
            ..Default::default()
        };

        for exec in executions.iter().filter(|e| e.account_id == account_id) {
            match exec.status {
                ExecutionStatus::Open => stats.open += 1,
                ExecutionStatus::Failed => stats.failed += 1,
                ExecutionStatus::Skipped => stats.skipped += 1,
                ExecutionStatus::Closed => {
                    stats.closed += 1;
                    let pnl = exec.realized_pnl.unwrap_or_default();
                    stats.realized_pnl += pnl;
                    if pnl > Decimal::ZERO {
                        stats.wins += 1;
                    } else if pnl < Decimal::ZERO {
                        stats.losses += 1;
                    }
                }
            }
        }

        if stats.closed > 0 {
            stats.win_rate = stats.wins as f64 / stats.closed as f64;
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalDirection;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn settled(direction: SignalDirection, status: SignalStatus, close: Decimal, minutes: i64) -> Signal {
        let mut signal = match direction {
            SignalDirection::Buy => Signal::new("XAUUSD", direction, dec!(2350), dec!(2340), dec!(2370)),
            SignalDirection::Sell => Signal::new("XAUUSD", direction, dec!(2350), dec!(2360), dec!(2330)),
        }
        .unwrap();
        signal
            .settle(status, close, Utc::now() + Duration::minutes(minutes))
            .unwrap();
        signal
    }

    #[test]
    fn test_signal_stats() {
        let config = TradingConfig::default();
        let mut cancelled =
            Signal::new("XAUUSD", SignalDirection::Buy, dec!(2350), dec!(2340), dec!(2370)).unwrap();
        cancelled.status = SignalStatus::Cancelled;

        let signals = vec![
            settled(SignalDirection::Buy, SignalStatus::HitTarget, dec!(2370), 1), // +200
            settled(SignalDirection::Buy, SignalStatus::HitStop, dec!(2340), 2),   // -100
            settled(SignalDirection::Sell, SignalStatus::HitStop, dec!(2360), 3),  // -100
            settled(SignalDirection::Sell, SignalStatus::Closed, dec!(2345), 4),   // +50
            cancelled,
            Signal::new("XAUUSD", SignalDirection::Buy, dec!(2350), dec!(2340), dec!(2370)).unwrap(),
        ];

        let stats = SignalStats::from_signals(&signals, &config);

        assert_eq!(stats.total, 6);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.settled, 4);
        assert_eq!(stats.manually_closed, 1);
        assert_eq!(stats.wins, 2);
        assert_eq!(stats.losses, 2);
        assert!((stats.win_rate - 0.5).abs() < 1e-9);
        assert_eq!(stats.total_pips, dec!(50));
        assert_eq!(stats.avg_win_pips, dec!(125));
        assert_eq!(stats.avg_loss_pips, dec!(100));
        assert!((stats.profit_factor.unwrap() - 1.25).abs() < 1e-9);
        assert_eq!(stats.expectancy, dec!(12.5));
        // Peak +200, trough 0
        assert_eq!(stats.max_drawdown_pips, dec!(200));
        assert_eq!(stats.best_pips, Some(dec!(200)));
        assert_eq!(stats.worst_pips, Some(dec!(-100)));
        assert!(stats.pip_std_dev.unwrap() > 0.0);
    }

    #[test]
    fn test_empty_and_all_wins() {
        let config = TradingConfig::default();
        let stats = SignalStats::from_signals(&[], &config);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.win_rate, 0.0);
        assert!(stats.best_pips.is_none());

        let signals = vec![settled(SignalDirection::Buy, SignalStatus::HitTarget, dec!(2370), 1)];
        let stats = SignalStats::from_signals(&signals, &config);
        assert_eq!(stats.profit_factor, None);
        assert_eq!(stats.pip_std_dev, None);
        assert_eq!(stats.max_drawdown_pips, Decimal::ZERO);
    }

    #[test]
    fn test_drawdown_from_initial_losses() {
        let config = TradingConfig::default();
        let signals = vec![
            settled(SignalDirection::Buy, SignalStatus::HitStop, dec!(2340), 1),
            settled(SignalDirection::Buy, SignalStatus::HitStop, dec!(2340), 2),
            settled(SignalDirection::Buy, SignalStatus::HitTarget, dec!(2370), 3),
        ];
        let stats = SignalStats::from_signals(&signals, &config);
        assert_eq!(stats.max_drawdown_pips, dec!(200));
    }

    #[test]
    fn test_account_stats() {
        let signal =
            Signal::new("XAUUSD", SignalDirection::Buy, dec!(2350), dec!(2340), dec!(2370)).unwrap();
        let mut win = Execution::opened(&signal, "acc", dec!(0.1), dec!(2350), "o1");
        win.status = ExecutionStatus::Closed;
        win.realized_pnl = Some(dec!(200));
        let mut loss = Execution::opened(&signal, "acc", dec!(0.1), dec!(2350), "o2");
        loss.status = ExecutionStatus::Closed;
        loss.realized_pnl = Some(dec!(-100));
        let open = Execution::opened(&signal, "acc", dec!(0.1), dec!(2350), "o3");
        let other = Execution::opened(&signal, "other", dec!(0.1), dec!(2350), "o4");
        let skipped = Execution::skipped(&signal.id, "acc", signal.direction, "tier");

        let stats = AccountStats::from_executions("acc", &[win, loss, open, other, skipped]);
        assert_eq!(stats.closed, 2);
        assert_eq!(stats.open, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.realized_pnl, dec!(100));
        assert!((stats.win_rate - 0.5).abs() < 1e-9);
    }
}
