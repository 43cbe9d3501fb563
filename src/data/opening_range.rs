/// Per-symbol, per-day opening range, captured once and read-only for the
/// rest of the session (§3, §4.2). Owned exclusively by the Orchestrator
/// (T-FSM); this type holds no internal locking of its own.
use std::collections::HashMap;

use tracing::warn;

use crate::market::MarketDataGateway;
use crate::types::{OpeningRange, Symbol};

#[derive(Default)]
pub struct OpeningRangeStore {
    ranges: HashMap<Symbol, OpeningRange>,
    untradeable: HashMap<Symbol, String>,
}

impl OpeningRangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Option<&OpeningRange> {
        self.ranges.get(symbol)
    }

    pub fn is_untradeable(&self, symbol: &str) -> bool {
        self.untradeable.contains_key(symbol)
    }

    pub fn reset(&mut self) {
        self.ranges.clear();
        self.untradeable.clear();
    }

    /// Captures the opening range for `universe` via a batched quote
    /// request, retrying the missing subset with exponential backoff up to
    /// `max_retries` times before marking the stragglers un-tradeable for
    /// the day (§4.2).
    pub async fn capture(
        &mut self,
        gateway: &dyn MarketDataGateway,
        universe: &[Symbol],
        max_retries: u32,
    ) -> crate::Result<()> {
        let mut pending: Vec<Symbol> = universe.to_vec();
        let mut attempt = 0;

        while !pending.is_empty() && attempt <= max_retries {
            if attempt > 0 {
                let backoff = std::time::Duration::from_millis(200 * 2u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }

            let quotes = gateway.batch_quote(&pending).await?;
            let mut still_missing = Vec::new();

            for symbol in &pending {
                match quotes.get(symbol) {
                    Some(quote) => {
                        self.ranges.insert(
                            symbol.clone(),
                            OpeningRange::new(quote.high, quote.low, quote.open, quote.price, quote.volume),
                        );
                    }
                    None => still_missing.push(symbol.clone()),
                }
            }

            pending = still_missing;
            attempt += 1;
        }

        for symbol in pending {
            warn!(%symbol, "opening range capture exhausted retries, marking un-tradeable");
            self.untradeable.insert(symbol, "ORB_CAPTURE_EXHAUSTED".to_string());
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MockGateway;
    use crate::types::Quote;
    use chrono::Utc;

    fn quote(price: f64) -> Quote {
        Quote { price, bid: price, ask: price, volume: 10_000, high: price + 1.0, low: price - 1.0, open: price - 0.5, ts: Utc::now() }
    }

    #[tokio::test]
    async fn captures_every_seeded_symbol() {
        let gateway = MockGateway::new(0.0);
        gateway.seed_quote("AAPL", quote(100.0)).await;
        gateway.seed_quote("MSFT", quote(200.0)).await;

        let mut store = OpeningRangeStore::new();
        store
            .capture(&gateway, &["AAPL".to_string(), "MSFT".to_string()], 2)
            .await
            .unwrap();

        assert_eq!(store.len(), 2);
        assert!(!store.is_untradeable("AAPL"));
    }

    #[tokio::test]
    async fn marks_unresolved_symbols_untradeable_after_retries() {
        let gateway = MockGateway::new(0.0);
        gateway.seed_quote("AAPL", quote(100.0)).await;

        let mut store = OpeningRangeStore::new();
        store
            .capture(&gateway, &["AAPL".to_string(), "GHOST".to_string()], 1)
            .await
            .unwrap();

        assert!(store.get("AAPL").is_some());
        assert!(store.is_untradeable("GHOST"));
    }
}
