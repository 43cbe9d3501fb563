/// Centralized error taxonomy for the orchestrator.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TradingError {
    // Transient I/O: broker quote / order, state-store write (§7).
    #[error("market data gateway request failed: {0}")]
    GatewayError(#[from] reqwest::Error),

    #[error("gateway timed out: {0}")]
    GatewayTimeout(String),

    #[error("order placement failed: {0}")]
    OrderPlacementFailed(String),

    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error("state store write failed: {0}")]
    StateStoreWriteFailed(String),

    #[error("state store read failed: {0}")]
    StateStoreReadFailed(String),

    // Auth.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    // Position errors.
    #[error("position not found: {0}")]
    PositionNotFound(String),

    #[error("position already exists: {0}")]
    DuplicatePosition(String),

    // Sizer / invariant violations — treated as fatal programmer error (§7).
    #[error("sizer invariant violated: {0}")]
    SizerInvariantViolated(String),

    // Configuration.
    #[error("configuration error: {0}")]
    ConfigError(String),

    // File I/O.
    #[error("file I/O error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    // Market session / scheduling.
    #[error("non-trading day: {0}")]
    NonTradingDay(String),

    // Alert sink.
    #[error("alert dispatch failed: {0}")]
    AlertDispatchFailed(String),

    #[error("duplicate alert suppressed: {0}")]
    DuplicateAlert(String),

    // Recovery.
    #[error("cold-start recovery failed: {0}")]
    RecoveryFailed(String),

    // Generic.
    #[error("internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, TradingError>;

impl TradingError {
    /// Retried with exponential backoff before surfacing (§7).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TradingError::GatewayError(_)
                | TradingError::GatewayTimeout(_)
                | TradingError::OrderPlacementFailed(_)
                | TradingError::StateStoreWriteFailed(_)
        )
    }

    /// Aborts the current phase without emitting orders (§7).
    pub fn is_fatal(&self) -> bool {
        matches!(self, TradingError::SizerInvariantViolated(_) | TradingError::ConfigError(_))
    }

    /// Transitions the FSM to the READ_ONLY sub-state for the remainder of the day (§7).
    pub fn requires_read_only(&self) -> bool {
        matches!(self, TradingError::AuthenticationFailed(_))
    }

    /// Stable code for structured logging / alert payloads.
    pub fn error_code(&self) -> &'static str {
        match self {
            TradingError::GatewayError(_) => "GATEWAY_001",
            TradingError::GatewayTimeout(_) => "GATEWAY_002",
            TradingError::OrderPlacementFailed(_) => "ORDER_001",
            TradingError::OrderRejected(_) => "ORDER_002",
            TradingError::StateStoreWriteFailed(_) => "STATE_001",
            TradingError::StateStoreReadFailed(_) => "STATE_002",
            TradingError::AuthenticationFailed(_) => "AUTH_001",
            TradingError::PositionNotFound(_) => "POS_001",
            TradingError::DuplicatePosition(_) => "POS_002",
            TradingError::SizerInvariantViolated(_) => "SIZER_001",
            TradingError::ConfigError(_) => "CFG_001",
            TradingError::FileError(_) => "FILE_001",
            TradingError::SerializationError(_) => "FILE_002",
            TradingError::NonTradingDay(_) => "MKT_001",
            TradingError::AlertDispatchFailed(_) => "ALERT_001",
            TradingError::DuplicateAlert(_) => "ALERT_002",
            TradingError::RecoveryFailed(_) => "REC_001",
            TradingError::InternalError(_) => "INT_001",
        }
    }
}
