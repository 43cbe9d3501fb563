/// Deterministic in-memory gateway used by demo mode and the integration
/// tests. Fills instantly with a configurable slippage, the way the
/// teacher's paper-trading broker does.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;

use crate::error::Result;
use crate::market::{Fill, MarketDataGateway};
use crate::types::{Bar, Quote, Side, Symbol, Volume};

pub struct MockGateway {
    quotes: Arc<RwLock<HashMap<Symbol, Quote>>>,
    bars: Arc<RwLock<HashMap<Symbol, Bar>>>,
    adv: Arc<RwLock<HashMap<Symbol, Volume>>>,
    slippage_bps: f64,
    fills: Arc<RwLock<Vec<(String, i64, f64)>>>,
}

impl MockGateway {
    pub fn new(slippage_bps: f64) -> Self {
        MockGateway {
            quotes: Arc::new(RwLock::new(HashMap::new())),
            bars: Arc::new(RwLock::new(HashMap::new())),
            adv: Arc::new(RwLock::new(HashMap::new())),
            slippage_bps,
            fills: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn seed_quote(&self, symbol: impl Into<Symbol>, quote: Quote) {
        self.quotes.write().await.insert(symbol.into(), quote);
    }

    pub async fn seed_bar(&self, symbol: impl Into<Symbol>, bar: Bar) {
        self.bars.write().await.insert(symbol.into(), bar);
    }

    pub async fn seed_adv(&self, symbol: impl Into<Symbol>, adv: Volume) {
        self.adv.write().await.insert(symbol.into(), adv);
    }

    pub async fn fill_count(&self) -> usize {
        self.fills.read().await.len()
    }

    fn calculate_fill_price(&self, side: Side, reference_price: f64) -> f64 {
        let slippage = reference_price * (self.slippage_bps / 10_000.0);
        match side {
            Side::Long => reference_price + slippage,
            Side::Short => reference_price - slippage,
        }
    }
}

#[async_trait]
impl MarketDataGateway for MockGateway {
    async fn batch_quote(&self, symbols: &[Symbol]) -> Result<HashMap<Symbol, Quote>> {
        let quotes = self.quotes.read().await;
        Ok(symbols
            .iter()
            .filter_map(|s| quotes.get(s).map(|q| (s.clone(), *q)))
            .collect())
    }

    async fn bar(&self, symbol: &Symbol, _start: DateTime<Utc>, _end: DateTime<Utc>) -> Result<Bar> {
        let bars = self.bars.read().await;
        bars.get(symbol)
            .copied()
            .ok_or_else(|| crate::error::TradingError::GatewayTimeout(format!("no bar seeded for {symbol}")))
    }

    async fn adv(&self, symbol: &Symbol) -> Result<Volume> {
        let adv = self.adv.read().await;
        Ok(adv.get(symbol).copied().unwrap_or(0))
    }

    async fn place_order(
        &self,
        client_order_id: &str,
        symbol: &Symbol,
        side: Side,
        quantity: i64,
    ) -> Result<Fill> {
        let reference_price = self
            .quotes
            .read()
            .await
            .get(symbol)
            .map(|q| q.price)
            .unwrap_or(100.0);
        let fill_price = self.calculate_fill_price(side, reference_price);

        self.fills.write().await.push((client_order_id.to_string(), quantity, fill_price));

        info!(%symbol, %client_order_id, quantity, fill_price, "mock fill");

        Ok(Fill { filled_quantity: quantity, fill_price })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn quote(price: f64) -> Quote {
        Quote { price, bid: price, ask: price, volume: 1_000_000, high: price, low: price, open: price, ts: Utc::now() }
    }

    #[tokio::test]
    async fn fills_with_slippage_in_the_adverse_direction() {
        let gateway = MockGateway::new(5.0);
        gateway.seed_quote("AAPL", quote(100.0)).await;

        let fill = gateway.place_order("pos_1", &"AAPL".to_string(), Side::Long, 10).await.unwrap();
        assert!(fill.fill_price > 100.0);

        let fill = gateway.place_order("pos_2", &"AAPL".to_string(), Side::Short, 10).await.unwrap();
        assert!(fill.fill_price < 100.0);

        assert_eq!(gateway.fill_count().await, 2);
    }
}
