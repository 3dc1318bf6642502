//! Track-record and account statistics.

mod calculator;

pub use calculator::{AccountStats, SignalStats};
