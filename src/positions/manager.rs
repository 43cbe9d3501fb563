/// Open-position bookkeeping and the cash account (§4.7/§4.8, C10).
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{Result, TradingError};
use crate::types::{Account, ClosedTrade, Position, Symbol};

pub struct PositionManager {
    positions: Arc<RwLock<HashMap<String, Position>>>,
    closed_today: Arc<RwLock<Vec<ClosedTrade>>>,
    account: Arc<RwLock<Account>>,
}

impl PositionManager {
    pub fn new(starting_balance: f64) -> Self {
        PositionManager {
            positions: Arc::new(RwLock::new(HashMap::new())),
            closed_today: Arc::new(RwLock::new(Vec::new())),
            account: Arc::new(RwLock::new(Account { cash_balance: starting_balance, starting_balance })),
        }
    }

    pub fn from_account(account: Account) -> Self {
        PositionManager {
            positions: Arc::new(RwLock::new(HashMap::new())),
            closed_today: Arc::new(RwLock::new(Vec::new())),
            account: Arc::new(RwLock::new(account)),
        }
    }

    pub async fn open(&self, position: Position) -> Result<()> {
        let mut positions = self.positions.write().await;
        if positions.contains_key(&position.position_id) {
            return Err(TradingError::DuplicatePosition(position.position_id.clone()));
        }

        {
            let mut account = self.account.write().await;
            account.cash_balance -= position.entry_price * position.quantity as f64;
        }

        info!(
            position_id = %position.position_id,
            symbol = %position.symbol,
            quantity = position.quantity,
            entry_price = position.entry_price,
            "position opened"
        );
        positions.insert(position.position_id.clone(), position);
        Ok(())
    }

    /// Removes the position, updates cash, and appends a `ClosedTrade`.
    /// Callers must serialize this per-position (§4.8: "must serialise
    /// account mutations").
    pub async fn close(
        &self,
        position_id: &str,
        exit_price: f64,
        reason: String,
        exit_time: chrono::DateTime<chrono::Utc>,
    ) -> Result<ClosedTrade> {
        let position = {
            let mut positions = self.positions.write().await;
            positions.remove(position_id).ok_or_else(|| TradingError::PositionNotFound(position_id.to_string()))?
        };

        let trade = ClosedTrade::from_position(&position, exit_price, reason, exit_time);

        {
            let mut account = self.account.write().await;
            account.cash_balance += exit_price * position.quantity as f64;
        }

        warn!(
            position_id = %trade.position_id,
            symbol = %trade.symbol,
            pnl = trade.pnl_absolute,
            reason = %trade.exit_reason,
            "position closed"
        );
        self.closed_today.write().await.push(trade.clone());
        Ok(trade)
    }

    /// Re-inserts a position recovered from the state store on cold start.
    /// Unlike `open`, this does not touch cash: the balance was already
    /// debited before the crash and is itself being restored from the
    /// same checkpoint (§4.10, scenario S6).
    pub async fn restore(&self, position: Position) {
        self.positions.write().await.insert(position.position_id.clone(), position);
    }

    pub async fn get(&self, position_id: &str) -> Option<Position> {
        self.positions.read().await.get(position_id).cloned()
    }

    pub async fn open_positions(&self) -> Vec<Position> {
        self.positions.read().await.values().cloned().collect()
    }

    pub async fn open_count_for_symbol(&self, symbol: &Symbol) -> usize {
        self.positions.read().await.values().filter(|p| &p.symbol == symbol).count()
    }

    /// Applies an in-place mutation (stop progression, peak update) under
    /// the write lock so concurrent quote updates never race each other.
    pub async fn mutate<F: FnOnce(&mut Position)>(&self, position_id: &str, f: F) -> Result<()> {
        let mut positions = self.positions.write().await;
        let position = positions.get_mut(position_id).ok_or_else(|| TradingError::PositionNotFound(position_id.to_string()))?;
        f(position);
        Ok(())
    }

    pub async fn closed_today(&self) -> Vec<ClosedTrade> {
        self.closed_today.read().await.clone()
    }

    pub async fn account(&self) -> Account {
        *self.account.read().await
    }

    /// Called once per trading day after the account is persisted.
    pub async fn reset_daily(&self) {
        self.closed_today.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::positions::monitor::open_position;
    use crate::types::Side;
    use chrono::Utc;

    fn position(id: &str, price: f64, qty: i64) -> Position {
        open_position(id.to_string(), "AAPL".to_string(), Side::Long, price, qty, Utc::now(), 2.5)
    }

    #[tokio::test]
    async fn open_debits_cash_close_credits_it() {
        let manager = PositionManager::new(10_000.0);
        manager.open(position("p1", 100.0, 10)).await.unwrap();
        assert_eq!(manager.account().await.cash_balance, 9_000.0);

        manager.close("p1", 105.0, "TEST".to_string(), Utc::now()).await.unwrap();
        assert_eq!(manager.account().await.cash_balance, 9_000.0 + 1_050.0);
        assert_eq!(manager.closed_today().await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_position_id_rejected() {
        let manager = PositionManager::new(10_000.0);
        manager.open(position("p1", 100.0, 10)).await.unwrap();
        let result = manager.open(position("p1", 100.0, 10)).await;
        assert!(matches!(result, Err(TradingError::DuplicatePosition(_))));
    }

    #[tokio::test]
    async fn close_unknown_position_errors() {
        let manager = PositionManager::new(10_000.0);
        let result = manager.close("ghost", 1.0, "X".to_string(), Utc::now()).await;
        assert!(matches!(result, Err(TradingError::PositionNotFound(_))));
    }
}
