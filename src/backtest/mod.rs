// Synthetic market data for tests and offline replays
pub mod synthetic;

pub use synthetic::{fixed_series, MarketScenario, SyntheticDataGenerator};
