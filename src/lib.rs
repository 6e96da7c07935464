// Core modules
pub mod adaptive;
pub mod api;
pub mod backtest;
pub mod config;
pub mod db;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod ledger;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod strategy;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use error::TradingError;
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
