use thiserror::Error;

/// Failure taxonomy for the trading core
///
/// Every variant is scoped to a single instrument evaluation. None of them
/// may stop the scheduler for other instruments.
#[derive(Debug, Error)]
pub enum TradingError {
    /// Indicator fetch failed; the cycle is skipped and retried next interval
    #[error("market data unavailable for {instrument}: {reason}")]
    DataUnavailable { instrument: String, reason: String },

    /// Fewer candles than an indicator window needs; treated as Hold
    #[error("insufficient history: have {have} candles, need {need}")]
    InsufficientHistory { have: usize, need: usize },

    /// Indicator math produced an undefined value
    #[error("computation error: {0}")]
    Computation(String),

    /// Attempt to open a second position for an instrument that is already open
    #[error("position already open for {instrument}")]
    StateViolation { instrument: String },

    /// Ledger write failed after retrying
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("notification error: {0}")]
    Notification(String),
}

impl From<std::io::Error> for TradingError {
    fn from(err: std::io::Error) -> Self {
        TradingError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for TradingError {
    fn from(err: serde_json::Error) -> Self {
        TradingError::Persistence(err.to_string())
    }
}

impl From<sqlx::Error> for TradingError {
    fn from(err: sqlx::Error) -> Self {
        TradingError::Persistence(err.to_string())
    }
}

impl From<config::ConfigError> for TradingError {
    fn from(err: config::ConfigError) -> Self {
        TradingError::Config(err.to_string())
    }
}
