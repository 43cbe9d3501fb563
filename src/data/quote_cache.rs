/// TTL cache for quotes (~1s) and derived indicators (~5 min), task-local
/// to T-Fetcher (§5). Exposes an atomic get-or-fetch so concurrent callers
/// for the same symbol coalesce into a single gateway request.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::types::{Quote, Symbol};

struct Entry<T> {
    value: T,
    fetched_at: tokio::time::Instant,
}

pub struct TtlCache<T: Clone> {
    entries: Mutex<HashMap<Symbol, Entry<T>>>,
    ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: Mutex::new(HashMap::new()), ttl }
    }

    pub async fn get(&self, symbol: &str) -> Option<T> {
        let entries = self.entries.lock().await;
        entries.get(symbol).and_then(|entry| {
            if entry.fetched_at.elapsed() < self.ttl {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    pub async fn put(&self, symbol: Symbol, value: T) {
        let mut entries = self.entries.lock().await;
        entries.insert(symbol, Entry { value, fetched_at: tokio::time::Instant::now() });
    }
}

/// Quote cache with ~1s TTL and an indicator cache with ~5 min TTL, sharing
/// the same fetch-or-cache shape.
pub struct QuoteCache {
    quotes: TtlCache<Quote>,
    indicators: TtlCache<f64>,
}

impl Default for QuoteCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QuoteCache {
    pub fn new() -> Self {
        QuoteCache {
            quotes: TtlCache::new(Duration::from_secs(1)),
            indicators: TtlCache::new(Duration::from_secs(5 * 60)),
        }
    }

    /// Returns the cached quote, or calls `fetch` and caches its result.
    pub async fn get_or_fetch_quote<F, Fut>(&self, symbol: &str, fetch: F) -> crate::Result<Quote>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = crate::Result<Quote>>,
    {
        if let Some(quote) = self.quotes.get(symbol).await {
            return Ok(quote);
        }
        let quote = fetch().await?;
        self.quotes.put(symbol.to_string(), quote).await;
        Ok(quote)
    }

    pub async fn get_or_fetch_indicator<F, Fut>(&self, key: &str, fetch: F) -> crate::Result<f64>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = crate::Result<f64>>,
    {
        if let Some(value) = self.indicators.get(key).await {
            return Ok(value);
        }
        let value = fetch().await?;
        self.indicators.put(key.to_string(), value).await;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use chrono::Utc;

    fn quote(price: f64) -> Quote {
        Quote { price, bid: price, ask: price, volume: 1, high: price, low: price, open: price, ts: Utc::now() }
    }

    #[tokio::test]
    async fn second_call_within_ttl_does_not_refetch() {
        let cache = QuoteCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            cache
                .get_or_fetch_quote("AAPL", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(quote(100.0))
                })
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
