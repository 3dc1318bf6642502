//! Price feeds: the external HTTP quote provider and a static in-process feed.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::types::{Quote, QuoteResponse};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(30);

/// Source of the latest quote for a symbol.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn latest(&self, symbol: &str) -> Result<Quote>;
}

/// Client for an HTTP quote endpoint (`GET {base_url}?symbol=XAUUSD`).
pub struct HttpPriceFeed {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    retry_window: Duration,
}

/// Whether a non-success status is worth retrying.
///
/// Server errors and rate limiting clear up on their own; any other
/// client error will fail the same way again.
pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

impl HttpPriceFeed {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
            retry_window: MAX_RETRY_ELAPSED,
        })
    }

    /// Give up retrying once `window` has elapsed since the first attempt.
    pub fn with_retry_window(mut self, window: Duration) -> Self {
        self.retry_window = window;
        self
    }

    async fn fetch_once(&self, url: &str) -> Result<QuoteResponse, backoff::Error<anyhow::Error>> {
        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| backoff::Error::transient(anyhow!(e).context("Failed to fetch quote")))?;

        let status = response.status();
        if is_transient_status(status) {
            return Err(backoff::Error::transient(anyhow!(
                "Quote request failed: {}",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(backoff::Error::permanent(anyhow!(
                "Quote request failed: {} - {}",
                status,
                body
            )));
        }

        response.json::<QuoteResponse>().await.map_err(|e| {
            backoff::Error::permanent(anyhow!(e).context("Failed to parse quote response"))
        })
    }
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    async fn latest(&self, symbol: &str) -> Result<Quote> {
        let url = format!("{}?symbol={}", self.base_url, symbol);
        debug!(url = %url, "Fetching quote");

        let policy = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(self.retry_window))
            .build();

        let url_ref = url.as_str();
        let response = backoff::future::retry_notify(
            policy,
            || async move { self.fetch_once(url_ref).await },
            |err, wait: Duration| {
                warn!(error = %err, retry_in_ms = wait.as_millis() as u64, "Quote fetch failed, retrying");
            },
        )
        .await?;

        quote_from_response(symbol, response)
    }
}

/// Normalise a provider response into a bid/ask quote.
pub fn quote_from_response(symbol: &str, response: QuoteResponse) -> Result<Quote> {
    let (bid, ask) = match (response.bid, response.ask, response.price) {
        (Some(bid), Some(ask), _) => (bid, ask),
        (_, _, Some(price)) => (price, price),
        _ => anyhow::bail!("Quote response has neither bid/ask nor price"),
    };

    if bid <= Decimal::ZERO || ask < bid {
        anyhow::bail!("Implausible quote: bid {} ask {}", bid, ask);
    }

    let timestamp = response
        .timestamp
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or_else(Utc::now);

    Ok(Quote {
        symbol: response.symbol.unwrap_or_else(|| symbol.to_string()),
        bid,
        ask,
        timestamp,
    })
}

/// In-process feed holding a settable quote.
pub struct StaticPriceFeed {
    quote: RwLock<Quote>,
}

impl StaticPriceFeed {
    pub fn new(quote: Quote) -> Self {
        Self {
            quote: RwLock::new(quote),
        }
    }

    /// Feed with a flat (zero-spread) price.
    pub fn at(symbol: &str, price: Decimal) -> Self {
        Self::new(Quote::flat(symbol, price))
    }

    pub async fn set_price(&self, price: Decimal) {
        let mut quote = self.quote.write().await;
        quote.bid = price;
        quote.ask = price;
        quote.timestamp = Utc::now();
    }
}

#[async_trait]
impl PriceFeed for StaticPriceFeed {
    async fn latest(&self, _symbol: &str) -> Result<Quote> {
        Ok(self.quote.read().await.clone())
    }
}
