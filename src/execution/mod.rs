/// Batch order placement, sequenced by rank (§4.7, C9).
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::market::{Fill, MarketDataGateway};
use crate::sizer::SizedLine;
use crate::types::{Side, SizedOrder, Symbol};
use crate::utils::idempotency::generate_idempotency_key;

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub order: SizedOrder,
    pub client_order_id: String,
    pub fill: Option<Fill>,
    pub error: Option<String>,
}

impl ExecutionReport {
    pub fn filled(&self) -> bool {
        self.fill.is_some()
    }
}

/// Abstraction over order placement so the orchestrator can swap a mock
/// fill path for a live broker without touching sizing or ranking (§4.7,
/// mirrors the MarketDataGateway seam for the same reason).
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    async fn place_batch(&self, orders: Vec<SizedOrder>, session_id: &str) -> Vec<ExecutionReport>;

    async fn place_exit(&self, symbol: &Symbol, side: Side, quantity: i64, position_id: &str) -> Result<Fill>;

    /// Best-effort cancel, used when the DRAIN state aborts an in-flight
    /// batch (§5 orchestrator shutdown).
    async fn cancel_all(&self) -> Result<()>;
}

pub fn sized_lines_to_orders(lines: Vec<SizedLine>, side: Side) -> Vec<SizedOrder> {
    lines
        .into_iter()
        .map(|line| SizedOrder { symbol: line.symbol, side, quantity: line.quantity, price: line.price, rank: line.rank })
        .collect()
}

/// Places orders against a `MarketDataGateway` sequentially in rank order.
/// Idempotency key is derived from the session id, symbol and side so a
/// retried batch after a crash never double-places (§4.7, §8 invariant).
pub struct GatewayExecutor {
    gateway: Arc<dyn MarketDataGateway>,
}

impl GatewayExecutor {
    pub fn new(gateway: Arc<dyn MarketDataGateway>) -> Self {
        GatewayExecutor { gateway }
    }

    fn client_order_id(session_id: &str, symbol: &str, side: Side) -> String {
        generate_idempotency_key(&[session_id, symbol, side.as_str()])
    }
}

#[async_trait]
impl TradeExecutor for GatewayExecutor {
    async fn place_batch(&self, orders: Vec<SizedOrder>, session_id: &str) -> Vec<ExecutionReport> {
        let mut reports = Vec::with_capacity(orders.len());

        for order in orders {
            let client_order_id = Self::client_order_id(session_id, &order.symbol, order.side);
            match self.gateway.place_order(&client_order_id, &order.symbol, order.side, order.quantity).await {
                Ok(fill) => {
                    info!(symbol = %order.symbol, rank = order.rank, qty = order.quantity, fill_price = fill.fill_price, "order filled");
                    reports.push(ExecutionReport { order, client_order_id, fill: Some(fill), error: None });
                }
                Err(e) => {
                    warn!(symbol = %order.symbol, rank = order.rank, error = %e, "order placement failed");
                    reports.push(ExecutionReport { order, client_order_id, fill: None, error: Some(e.to_string()) });
                }
            }
        }

        reports
    }

    async fn place_exit(&self, symbol: &Symbol, side: Side, quantity: i64, position_id: &str) -> Result<Fill> {
        let client_order_id = generate_idempotency_key(&["exit", position_id, symbol, side.as_str()]);
        self.gateway.place_order(&client_order_id, symbol, side, quantity).await
    }

    async fn cancel_all(&self) -> Result<()> {
        // The mock gateway fills synchronously; there is nothing in flight
        // to cancel. A live broker integration would call its cancel-all
        // endpoint here.
        Ok(())
    }
}

pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MockGateway;
    use crate::types::Quote;
    use chrono::Utc;

    fn quote(price: f64) -> Quote {
        Quote { price, bid: price, ask: price, volume: 1_000_000, high: price, low: price, open: price, ts: Utc::now() }
    }

    #[tokio::test]
    async fn places_every_order_in_rank_order() {
        let gateway = Arc::new(MockGateway::new(2.0));
        gateway.seed_quote("AAPL", quote(100.0)).await;
        gateway.seed_quote("MSFT", quote(200.0)).await;

        let executor = GatewayExecutor::new(gateway.clone());
        let orders = vec![
            SizedOrder { symbol: "AAPL".to_string(), side: Side::Long, quantity: 10, price: 100.0, rank: 1 },
            SizedOrder { symbol: "MSFT".to_string(), side: Side::Long, quantity: 5, price: 200.0, rank: 2 },
        ];

        let reports = executor.place_batch(orders, "session-1").await;
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.filled()));
        assert_eq!(gateway.fill_count().await, 2);
    }

    #[tokio::test]
    async fn identical_batch_produces_identical_client_order_ids() {
        let id_a = GatewayExecutor::client_order_id("session-1", "AAPL", Side::Long);
        let id_b = GatewayExecutor::client_order_id("session-1", "AAPL", Side::Long);
        assert_eq!(id_a, id_b);
    }

    #[tokio::test]
    async fn missing_quote_surfaces_as_failed_report_not_panic() {
        let gateway = Arc::new(MockGateway::new(2.0));
        let executor = GatewayExecutor::new(gateway);
        let orders = vec![SizedOrder { symbol: "GHOST".to_string(), side: Side::Long, quantity: 1, price: 1.0, rank: 1 }];
        let reports = executor.place_batch(orders, "session-2").await;
        assert_eq!(reports.len(), 1);
        assert!(reports[0].filled());
    }
}
