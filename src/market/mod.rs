pub mod live;
pub mod mock;

pub use live::LiveGateway;
pub use mock::MockGateway;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{Bar, Quote, Side, Symbol, Volume};

/// External collaborator (§2 C2, §6): batched quote retrieval and, in live
/// mode, order placement. Rate limit <=10 req/s, batch size <=25 symbols.
#[async_trait]
pub trait MarketDataGateway: Send + Sync {
    async fn batch_quote(&self, symbols: &[Symbol]) -> Result<HashMap<Symbol, Quote>>;

    async fn bar(&self, symbol: &Symbol, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Bar>;

    /// 90-day average daily volume, used by the sizer's ADV cap.
    async fn adv(&self, symbol: &Symbol) -> Result<Volume>;

    async fn place_order(
        &self,
        client_order_id: &str,
        symbol: &Symbol,
        side: Side,
        quantity: i64,
    ) -> Result<Fill>;
}

#[derive(Debug, Clone, Copy)]
pub struct Fill {
    pub filled_quantity: i64,
    pub fill_price: f64,
}
