/// Core domain types shared across the orchestrator.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Price = f64;
pub type Dollars = f64;
pub type Volume = i64;

/// Opaque symbol identifier, unique within the configured universe.
pub type Symbol = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }
}

/// The high/low/open/close/volume captured once per symbol per day at the
/// close of the opening-range window. Immutable for the remainder of the
/// session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OpeningRange {
    pub high: Price,
    pub low: Price,
    pub open: Price,
    pub close: Price,
    pub volume: Volume,
}

impl OpeningRange {
    pub fn new(high: Price, low: Price, open: Price, close: Price, volume: Volume) -> Self {
        debug_assert!(low <= open && close <= high && low <= high);
        Self { high, low, open, close, volume }
    }

    pub fn range_pct(&self) -> f64 {
        if self.low == 0.0 {
            0.0
        } else {
            (self.high - self.low) / self.low * 100.0
        }
    }
}

/// A quote snapshot as returned by the market data gateway.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Quote {
    pub price: Price,
    pub bid: Price,
    pub ask: Price,
    pub volume: Volume,
    pub high: Price,
    pub low: Price,
    pub open: Price,
    pub ts: DateTime<Utc>,
}

/// A single OHLCV bar, used for the previous-15-minute-bar check in the
/// signal generator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bar {
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Volume,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// The raw feature bundle attached to every signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeatureBundle {
    pub rsi: f64,
    pub macd_histogram: f64,
    pub vwap_distance_pct: f64,
    pub rs_vs_spy_pct: f64,
    pub volume_ratio: f64,
    pub orb_volume_ratio: f64,
    pub entry_bar_volatility_pct: f64,
    pub confidence: f64,
}

/// Stage 1: a validated breakout candidate, prior to ranking or gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSignal {
    pub symbol: Symbol,
    pub side: Side,
    pub current_price: Price,
    pub features: FeatureBundle,
    pub generated_at: DateTime<Utc>,
}

/// Stage 2: a signal after percentile-based multi-factor ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedSignal {
    pub raw: RawSignal,
    pub priority_score: f64,
    pub rank: u32,
}

/// Stage 3: a ranked signal after the red-day filter has run. Signals
/// carry `is_red_day` whether or not they survive; rejected ones are kept
/// for the archive but dropped from the execution set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatedSignal {
    pub ranked: RankedSignal,
    pub is_red_day: bool,
    pub rejected: bool,
    pub reject_reason: Option<String>,
}

impl GatedSignal {
    pub fn symbol(&self) -> &str {
        &self.ranked.raw.symbol
    }

    pub fn price(&self) -> Price {
        self.ranked.raw.current_price
    }
}

/// Stage 4: a sized, executable order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizedOrder {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: i64,
    pub price: Price,
    pub rank: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

/// An open exposure. Created at fill, mutated only by the position
/// monitor, transitions to Closed exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub position_id: String,
    pub symbol: Symbol,
    pub side: Side,
    pub entry_price: Price,
    pub quantity: i64,
    pub entry_time: DateTime<Utc>,

    pub peak_price: Price,
    pub peak_time: DateTime<Utc>,
    pub max_adverse_excursion: f64,

    /// Permanent, volatility-tiered stop set at fill. Never relaxed.
    pub floor_stop: Price,
    pub current_stop: Price,
    pub breakeven_armed: bool,
    pub trailing_armed: bool,
    pub trailing_distance_pct: f64,

    pub status: PositionStatus,
}

impl Position {
    pub fn unrealized_pct(&self, current_price: Price) -> f64 {
        match self.side {
            Side::Long => (current_price - self.entry_price) / self.entry_price,
            Side::Short => (self.entry_price - current_price) / self.entry_price,
        }
    }

    pub fn peak_pct(&self) -> f64 {
        match self.side {
            Side::Long => (self.peak_price - self.entry_price) / self.entry_price,
            Side::Short => (self.entry_price - self.peak_price) / self.entry_price,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.entry_time
    }
}

/// Append-only record of a completed trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub position_id: String,
    pub symbol: Symbol,
    pub side: Side,
    pub entry_price: Price,
    pub quantity: i64,
    pub entry_time: DateTime<Utc>,
    pub exit_price: Price,
    pub exit_time: DateTime<Utc>,
    pub exit_reason: String,
    pub pnl_absolute: Dollars,
    pub pnl_pct: f64,
}

impl ClosedTrade {
    pub fn from_position(position: &Position, exit_price: Price, exit_reason: String, exit_time: DateTime<Utc>) -> Self {
        let signed_qty = position.quantity as f64;
        let pnl_absolute = match position.side {
            Side::Long => (exit_price - position.entry_price) * signed_qty,
            Side::Short => (position.entry_price - exit_price) * signed_qty,
        };
        let pnl_pct = position.unrealized_pct(exit_price);
        ClosedTrade {
            position_id: position.position_id.clone(),
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.entry_price,
            quantity: position.quantity,
            entry_time: position.entry_time,
            exit_price,
            exit_time,
            exit_reason,
            pnl_absolute,
            pnl_pct,
        }
    }
}

/// Cash account, updated atomically on every close.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Account {
    pub cash_balance: Dollars,
    pub starting_balance: Dollars,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum AlertKind {
    Morning,
    Holiday,
    OrbCapture,
    SignalCollection,
    BatchExecution,
    IndividualExit,
    AggregatedExit,
    HealthWarning,
    HealthEmergency,
    EodReport,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Morning => "MORNING",
            AlertKind::Holiday => "HOLIDAY",
            AlertKind::OrbCapture => "ORB_CAPTURE",
            AlertKind::SignalCollection => "SIGNAL_COLLECTION",
            AlertKind::BatchExecution => "BATCH_EXECUTION",
            AlertKind::IndividualExit => "INDIVIDUAL_EXIT",
            AlertKind::AggregatedExit => "AGGREGATED_EXIT",
            AlertKind::HealthWarning => "HEALTH_WARNING",
            AlertKind::HealthEmergency => "HEALTH_EMERGENCY",
            AlertKind::EodReport => "EOD_REPORT",
        }
    }

    /// Kinds the core must dedup to at most one per day (invariant 7).
    pub fn is_once_per_day(&self) -> bool {
        matches!(
            self,
            AlertKind::Morning
                | AlertKind::OrbCapture
                | AlertKind::SignalCollection
                | AlertKind::BatchExecution
                | AlertKind::EodReport
        )
    }
}

/// Per-date record of which phases have completed and which alerts have
/// been sent. Used for dedup and crash recovery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyMarker {
    pub date: String,
    pub phase_flags: std::collections::HashSet<String>,
    pub executed_symbols: std::collections::HashSet<String>,
    pub alerts_sent: std::collections::HashSet<String>,
}

impl DailyMarker {
    pub fn new(date: String) -> Self {
        DailyMarker { date, ..Default::default() }
    }

    pub fn phase_done(&self, phase: &str) -> bool {
        self.phase_flags.contains(phase)
    }

    pub fn mark_phase_done(&mut self, phase: &str) {
        self.phase_flags.insert(phase.to_string());
    }

    pub fn alert_sent(&self, kind: AlertKind) -> bool {
        self.alerts_sent.contains(kind.as_str())
    }

    pub fn mark_alert_sent(&mut self, kind: AlertKind) {
        self.alerts_sent.insert(kind.as_str().to_string());
    }
}
