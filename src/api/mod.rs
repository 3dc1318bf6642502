//! External providers: price feed and order execution.

mod broker;
mod price_feed;
mod types;

pub use broker::{Broker, SimulatedBroker};
pub use price_feed::{HttpPriceFeed, PriceFeed, StaticPriceFeed};
pub use types::{OrderFill, OrderRequest, Quote};
