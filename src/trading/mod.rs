//! Trading logic: signal evaluation, position sizing, auto-trade.

mod auto_trader;
mod config;
mod position_sizer;
mod signal_status;

pub use auto_trader::{AutoTradeReport, AutoTrader};
pub use config::TradingConfig;
pub use position_sizer::{ClampReason, PositionSizer};
pub use signal_status::{classify, evaluate, pips, pnl, settle_price};
