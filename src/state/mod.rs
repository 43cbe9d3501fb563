/// Durable state: trade log, account, daily marker, signal archive (§6,
/// C12). Grounded on the teacher's `EventBus` JSONL-append-log pattern
/// (events/event_bus.rs) and the file-backed persistence shape of its
/// `TokenManager`, retargeted from a pub/sub event log to trading state.
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{Result, TradingError};
use crate::types::{Account, ClosedTrade, DailyMarker, GatedSignal, Position};

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Appends to the write-log first; callers checkpoint the account
    /// afterward (§9 "write-log, derive balance" design note).
    async fn append_trade(&self, trade: &ClosedTrade) -> Result<()>;

    async fn read_account(&self) -> Result<Option<Account>>;
    async fn write_account(&self, account: &Account) -> Result<()>;

    async fn read_marker(&self, date: &str) -> Result<Option<DailyMarker>>;
    async fn write_marker(&self, marker: &DailyMarker) -> Result<()>;

    async fn archive_signals(&self, date: &str, signals: &[GatedSignal]) -> Result<()>;

    /// Replays today's trade log, used on cold start to rebuild the
    /// account if no checkpoint is found (§4.10, scenario S6).
    async fn replay_trades(&self, date: &str) -> Result<Vec<ClosedTrade>>;

    /// Checkpoints the full set of open positions, including stop/peak
    /// state, so a crash mid-MONITORING can resume without re-deriving
    /// trailing state from scratch (§4.10, scenario S6).
    async fn write_open_positions(&self, date: &str, positions: &[Position]) -> Result<()>;

    async fn read_open_positions(&self, date: &str) -> Result<Vec<Position>>;
}

/// Process-lifetime store backing demo mode and tests. Not durable across
/// restarts — `FileStateStore` is used whenever cold-start recovery
/// matters.
#[derive(Default)]
pub struct InMemoryStateStore {
    trades: RwLock<Vec<ClosedTrade>>,
    account: RwLock<Option<Account>>,
    markers: RwLock<std::collections::HashMap<String, DailyMarker>>,
    archives: RwLock<std::collections::HashMap<String, Vec<GatedSignal>>>,
    open_positions: RwLock<std::collections::HashMap<String, Vec<Position>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn append_trade(&self, trade: &ClosedTrade) -> Result<()> {
        self.trades.write().await.push(trade.clone());
        Ok(())
    }

    async fn read_account(&self) -> Result<Option<Account>> {
        Ok(*self.account.read().await)
    }

    async fn write_account(&self, account: &Account) -> Result<()> {
        *self.account.write().await = Some(*account);
        Ok(())
    }

    async fn read_marker(&self, date: &str) -> Result<Option<DailyMarker>> {
        Ok(self.markers.read().await.get(date).cloned())
    }

    async fn write_marker(&self, marker: &DailyMarker) -> Result<()> {
        self.markers.write().await.insert(marker.date.clone(), marker.clone());
        Ok(())
    }

    async fn archive_signals(&self, date: &str, signals: &[GatedSignal]) -> Result<()> {
        self.archives.write().await.insert(date.to_string(), signals.to_vec());
        Ok(())
    }

    async fn replay_trades(&self, date: &str) -> Result<Vec<ClosedTrade>> {
        Ok(self.trades.read().await.iter().filter(|t| t.exit_time.format("%Y-%m-%d").to_string() == date).cloned().collect())
    }

    async fn write_open_positions(&self, date: &str, positions: &[Position]) -> Result<()> {
        self.open_positions.write().await.insert(date.to_string(), positions.to_vec());
        Ok(())
    }

    async fn read_open_positions(&self, date: &str) -> Result<Vec<Position>> {
        Ok(self.open_positions.read().await.get(date).cloned().unwrap_or_default())
    }
}

/// JSONL-append trade log plus small JSON checkpoint files, one directory
/// per run (§6 object-key layout). Survives process restarts, which the
/// in-memory store cannot.
pub struct FileStateStore {
    dir: PathBuf,
    account_lock: Arc<RwLock<()>>,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileStateStore { dir: dir.into(), account_lock: Arc::new(RwLock::new(())) }
    }

    fn trade_log_path(&self) -> PathBuf {
        self.dir.join("trades.jsonl")
    }

    fn account_path(&self) -> PathBuf {
        self.dir.join("account.json")
    }

    fn marker_path(&self, date: &str) -> PathBuf {
        self.dir.join(format!("marker-{date}.json"))
    }

    fn archive_path(&self, date: &str) -> PathBuf {
        self.dir.join(format!("signals-{date}.json"))
    }

    fn positions_path(&self, date: &str) -> PathBuf {
        self.dir.join(format!("positions-{date}.json"))
    }

    async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn append_trade(&self, trade: &ClosedTrade) -> Result<()> {
        self.ensure_dir().await?;
        let line = serde_json::to_string(trade)?;
        let mut file = OpenOptions::new().create(true).append(true).open(self.trade_log_path()).await?;
        file.write_all(format!("{line}\n").as_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn read_account(&self) -> Result<Option<Account>> {
        let _guard = self.account_lock.read().await;
        match tokio::fs::read(self.account_path()).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TradingError::FileError(e)),
        }
    }

    async fn write_account(&self, account: &Account) -> Result<()> {
        self.ensure_dir().await?;
        let _guard = self.account_lock.write().await;
        let bytes = serde_json::to_vec_pretty(account)?;
        tokio::fs::write(self.account_path(), bytes).await?;
        Ok(())
    }

    async fn read_marker(&self, date: &str) -> Result<Option<DailyMarker>> {
        match tokio::fs::read(self.marker_path(date)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TradingError::FileError(e)),
        }
    }

    async fn write_marker(&self, marker: &DailyMarker) -> Result<()> {
        self.ensure_dir().await?;
        let bytes = serde_json::to_vec_pretty(marker)?;
        tokio::fs::write(self.marker_path(&marker.date), bytes).await?;
        debug!(date = %marker.date, "marker checkpointed");
        Ok(())
    }

    async fn archive_signals(&self, date: &str, signals: &[GatedSignal]) -> Result<()> {
        self.ensure_dir().await?;
        let bytes = serde_json::to_vec_pretty(signals)?;
        tokio::fs::write(self.archive_path(date), bytes).await?;
        Ok(())
    }

    async fn replay_trades(&self, date: &str) -> Result<Vec<ClosedTrade>> {
        let file = match tokio::fs::File::open(self.trade_log_path()).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(TradingError::FileError(e)),
        };
        let mut lines = BufReader::new(file).lines();
        let mut trades = Vec::new();
        while let Some(line) = lines.next_line().await? {
            match serde_json::from_str::<ClosedTrade>(&line) {
                Ok(trade) if trade.exit_time.format("%Y-%m-%d").to_string() == date => trades.push(trade),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "skipping malformed trade-log line during replay"),
            }
        }
        Ok(trades)
    }

    async fn write_open_positions(&self, date: &str, positions: &[Position]) -> Result<()> {
        self.ensure_dir().await?;
        let bytes = serde_json::to_vec_pretty(positions)?;
        tokio::fs::write(self.positions_path(date), bytes).await?;
        Ok(())
    }

    async fn read_open_positions(&self, date: &str) -> Result<Vec<Position>> {
        match tokio::fs::read(self.positions_path(date)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(TradingError::FileError(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;
    use chrono::Utc;

    fn trade(pnl: f64) -> ClosedTrade {
        ClosedTrade {
            position_id: "p1".to_string(),
            symbol: "AAPL".to_string(),
            side: Side::Long,
            entry_price: 100.0,
            quantity: 10,
            entry_time: Utc::now(),
            exit_price: 100.0 + pnl,
            exit_time: Utc::now(),
            exit_reason: "TEST".to_string(),
            pnl_absolute: pnl * 10.0,
            pnl_pct: pnl / 100.0,
        }
    }

    #[tokio::test]
    async fn in_memory_store_round_trips_account_and_marker() {
        let store = InMemoryStateStore::new();
        let account = Account { cash_balance: 9_500.0, starting_balance: 10_000.0 };
        store.write_account(&account).await.unwrap();
        let read = store.read_account().await.unwrap().unwrap();
        assert_eq!(read.cash_balance, 9_500.0);

        let mut marker = DailyMarker::new("2026-07-28".to_string());
        marker.mark_phase_done("ORB_CAPTURE");
        store.write_marker(&marker).await.unwrap();
        let read_marker = store.read_marker("2026-07-28").await.unwrap().unwrap();
        assert!(read_marker.phase_done("ORB_CAPTURE"));
    }

    #[tokio::test]
    async fn file_store_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("orb-state-test-{}", uuid::Uuid::new_v4()));
        let store = FileStateStore::new(&dir);

        store.append_trade(&trade(5.0)).await.unwrap();
        store.append_trade(&trade(-2.0)).await.unwrap();

        let account = Account { cash_balance: 10_030.0, starting_balance: 10_000.0 };
        store.write_account(&account).await.unwrap();
        let read = store.read_account().await.unwrap().unwrap();
        assert_eq!(read.cash_balance, 10_030.0);

        let today = trade(1.0).exit_time.format("%Y-%m-%d").to_string();
        let replayed = store.replay_trades(&today).await.unwrap();
        assert_eq!(replayed.len(), 2);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn missing_account_file_returns_none_not_error() {
        let dir = std::env::temp_dir().join(format!("orb-state-test-{}", uuid::Uuid::new_v4()));
        let store = FileStateStore::new(&dir);
        assert!(store.read_account().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_round_trips_open_positions() {
        use crate::types::{Position, PositionStatus, Side};
        let dir = std::env::temp_dir().join(format!("orb-state-test-{}", uuid::Uuid::new_v4()));
        let store = FileStateStore::new(&dir);

        let now = Utc::now();
        let position = Position {
            position_id: "pos-1".to_string(),
            symbol: "AAPL".to_string(),
            side: Side::Long,
            entry_price: 100.0,
            quantity: 10,
            entry_time: now,
            peak_price: 101.5,
            peak_time: now,
            max_adverse_excursion: 0.0,
            floor_stop: 97.0,
            current_stop: 98.0,
            breakeven_armed: true,
            trailing_armed: false,
            trailing_distance_pct: 0.0,
            status: PositionStatus::Open,
        };

        store.write_open_positions("2026-07-28", std::slice::from_ref(&position)).await.unwrap();
        let reloaded = store.read_open_positions("2026-07-28").await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].position_id, "pos-1");
        assert_eq!(reloaded[0].current_stop, 98.0);
        assert!(reloaded[0].breakeven_armed);

        let empty = store.read_open_positions("2026-07-29").await.unwrap();
        assert!(empty.is_empty());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
