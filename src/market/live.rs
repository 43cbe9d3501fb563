/// Live market-data/execution gateway (§2 C2, §7). Grounded on the
/// teacher's `AngelOneClient` (broker/angel_one.rs): a `reqwest::Client`
/// built once with a fixed timeout, JSON request/response DTOs, and error
/// mapping into the shared `TradingError` taxonomy. The wire format of any
/// particular broker is explicitly out of scope (§1 non-goals); this
/// targets a generic REST quote/order API and is meant to be swapped for
/// a concrete broker's DTOs without touching the trait boundary.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, TradingError};
use crate::market::{Fill, MarketDataGateway};
use crate::types::{Bar, Quote, Side, Symbol, Volume};
use crate::utils::RateLimiter;

/// Gateway calls are capped at <=10 req/s and <=25 symbols per batch (§6).
const MAX_BATCH_SIZE: usize = 25;
const REQUESTS_PER_SECOND: u32 = 10;

#[derive(Debug, Serialize)]
struct QuoteRequest<'a> {
    symbols: &'a [Symbol],
}

#[derive(Debug, Deserialize)]
struct QuoteResponseEntry {
    symbol: Symbol,
    price: f64,
    bid: f64,
    ask: f64,
    volume: Volume,
    high: f64,
    low: f64,
    open: f64,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    quotes: Vec<QuoteResponseEntry>,
}

#[derive(Debug, Deserialize)]
struct BarResponse {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: Volume,
}

#[derive(Debug, Deserialize)]
struct AdvResponse {
    average_daily_volume: Volume,
}

#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    client_order_id: &'a str,
    symbol: &'a str,
    side: &'static str,
    quantity: i64,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    status: String,
    filled_quantity: Option<i64>,
    fill_price: Option<f64>,
    message: Option<String>,
}

/// REST-backed gateway for `Mode::Live`. Quote fetches are chunked to
/// `MAX_BATCH_SIZE` and throttled through a shared `RateLimiter` (teacher's
/// token-bucket, `utils/rate_limiter.rs`) so the fetcher pool (T-Fetcher,
/// §5) never exceeds the external API's budget regardless of how many
/// symbols the universe holds.
pub struct LiveGateway {
    client: Client,
    base_url: String,
    api_key: String,
    limiter: Arc<RateLimiter>,
}

impl LiveGateway {
    pub fn new(base_url: String, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(TradingError::GatewayError)?;
        Ok(LiveGateway { client, base_url, api_key, limiter: Arc::new(RateLimiter::new(REQUESTS_PER_SECOND)) })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn fetch_chunk(&self, chunk: &[Symbol]) -> Result<HashMap<Symbol, Quote>> {
        self.limiter.acquire().await;

        let response = self
            .client
            .post(self.url("/v1/quotes"))
            .bearer_auth(&self.api_key)
            .json(&QuoteRequest { symbols: chunk })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TradingError::GatewayTimeout(format!("quote request returned {}", response.status())));
        }

        let body: QuoteResponse = response.json().await?;
        let now = Utc::now();
        Ok(body
            .quotes
            .into_iter()
            .map(|q| {
                (
                    q.symbol.clone(),
                    Quote { price: q.price, bid: q.bid, ask: q.ask, volume: q.volume, high: q.high, low: q.low, open: q.open, ts: now },
                )
            })
            .collect())
    }
}

#[async_trait]
impl MarketDataGateway for LiveGateway {
    async fn batch_quote(&self, symbols: &[Symbol]) -> Result<HashMap<Symbol, Quote>> {
        let mut merged = HashMap::new();
        for chunk in symbols.chunks(MAX_BATCH_SIZE) {
            let quotes = self.fetch_chunk(chunk).await?;
            merged.extend(quotes);
        }
        Ok(merged)
    }

    async fn bar(&self, symbol: &Symbol, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Bar> {
        self.limiter.acquire().await;

        let response = self
            .client
            .get(self.url(&format!("/v1/bars/{symbol}")))
            .bearer_auth(&self.api_key)
            .query(&[("start", start.to_rfc3339()), ("end", end.to_rfc3339())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TradingError::GatewayTimeout(format!("bar request for {symbol} returned {}", response.status())));
        }

        let body: BarResponse = response.json().await?;
        Ok(Bar { open: body.open, high: body.high, low: body.low, close: body.close, volume: body.volume, start, end })
    }

    async fn adv(&self, symbol: &Symbol) -> Result<Volume> {
        self.limiter.acquire().await;

        let response = self
            .client
            .get(self.url(&format!("/v1/adv/{symbol}")))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(%symbol, status = %response.status(), "adv lookup failed, treating as zero volume");
            return Ok(0);
        }

        let body: AdvResponse = response.json().await?;
        Ok(body.average_daily_volume)
    }

    async fn place_order(&self, client_order_id: &str, symbol: &Symbol, side: Side, quantity: i64) -> Result<Fill> {
        self.limiter.acquire().await;

        let response = self
            .client
            .post(self.url("/v1/orders"))
            .bearer_auth(&self.api_key)
            .json(&OrderRequest { client_order_id, symbol, side: side.as_str(), quantity })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TradingError::OrderPlacementFailed(format!("{symbol} order returned {}", response.status())));
        }

        let body: OrderResponse = response.json().await?;
        debug!(%symbol, %client_order_id, status = %body.status, "order response received");

        if body.status != "FILLED" {
            return Err(TradingError::OrderRejected(body.message.unwrap_or_else(|| body.status.clone())));
        }

        let filled_quantity = body.filled_quantity.unwrap_or(quantity);
        let fill_price = body.fill_price.ok_or_else(|| TradingError::OrderPlacementFailed("fill reported without a price".to_string()))?;
        Ok(Fill { filled_quantity, fill_price })
    }
}
