// Signal scoring
pub mod signals;

pub use signals::{classify_trend, SignalConfig, SignalScorer};
