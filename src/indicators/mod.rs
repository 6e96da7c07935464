// Technical indicators module
// RSI, MACD, Bollinger Bands, ADX, moving averages and volatility,
// combined into per-candle snapshots

pub mod adx;
pub mod bollinger;
pub mod macd;
pub mod moving_average;
pub mod rsi;
pub mod snapshot;
pub mod volatility;

pub use adx::calculate_adx;
pub use bollinger::{calculate_bollinger, BollingerBands};
pub use macd::{macd_series, MacdValue};
pub use moving_average::{calculate_sma, ema_series};
pub use rsi::calculate_rsi;
pub use snapshot::{build_snapshots, IndicatorParams};
pub use volatility::{calculate_volatility, calculate_volume_ratio};
