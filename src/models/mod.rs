//! Data models for signals, subscriptions, trading accounts and executions.

mod account;
mod execution;
mod signal;
mod subscription;

pub use account::TradingAccount;
pub use execution::{Execution, ExecutionStatus};
pub use signal::{Signal, SignalDirection, SignalStatus};
pub use subscription::{Subscription, SubscriptionTier};
