use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod timeframe;

pub use timeframe::Timeframe;

/// Quote currencies recognised when normalising exchange symbols like `BTCUSDT`
const QUOTE_ASSETS: [&str; 6] = ["USDT", "USDC", "BUSD", "FDUSD", "BTC", "ETH"];

/// Normalise an instrument id to the canonical `BASE/QUOTE` form
///
/// Accepts `BTC/USDT`, `btc-usdt` and `BTCUSDT`.
pub fn normalize_instrument(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase().replace('-', "/");
    if upper.contains('/') {
        return upper;
    }
    for quote in QUOTE_ASSETS {
        if upper.len() > quote.len() && upper.ends_with(quote) {
            let base = &upper[..upper.len() - quote.len()];
            return format!("{}/{}", base, quote);
        }
    }
    upper
}

/// Exchange-side symbol for an instrument (`BTC/USDT` -> `BTCUSDT`)
pub fn exchange_symbol(instrument: &str) -> String {
    normalize_instrument(instrument).replace('/', "")
}

/// OHLCV candlestick for one closed interval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub instrument: String,
    pub timestamp: DateTime<Utc>, // open time of the interval
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Indicator values for one closed candle
///
/// Produced once per candle by the snapshot provider and never mutated.
/// All fields are finite: values that could not be computed were replaced
/// by neutral defaults when the snapshot was built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub volume: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
    pub sma_20: f64,
    pub sma_50: f64,
    pub ema_9: f64,
    pub ema_21: f64,
    pub volatility: f64,   // std dev of recent returns, percent
    pub volume_ratio: f64, // volume / average volume
}

impl IndicatorSnapshot {
    /// Position of the close inside the Bollinger band (0 = lower, 1 = upper)
    pub fn bollinger_position(&self) -> f64 {
        let width = self.bb_upper - self.bb_lower;
        if width <= 0.0 || !width.is_finite() {
            return 0.5;
        }
        (self.close - self.bb_lower) / width
    }
}

/// Trend derived from price against the 20/50 period moving averages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendClassification {
    Up,
    Down,
    Sideways,
    Unknown,
}

impl TrendClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendClassification::Up => "up",
            TrendClassification::Down => "down",
            TrendClassification::Sideways => "sideways",
            TrendClassification::Unknown => "unknown",
        }
    }

    /// +1 for up, -1 for down, 0 otherwise
    pub fn as_score(&self) -> f64 {
        match self {
            TrendClassification::Up => 1.0,
            TrendClassification::Down => -1.0,
            _ => 0.0,
        }
    }
}

/// Trading signal direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
            Direction::Hold => "HOLD",
        };
        write!(f, "{}", s)
    }
}

/// Side of an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn from_direction(direction: Direction) -> Option<Side> {
        match direction {
            Direction::Buy => Some(Side::Long),
            Direction::Sell => Some(Side::Short),
            Direction::Hold => None,
        }
    }

    /// Directional profit/loss in percent
    pub fn pnl_pct(&self, entry_price: f64, price: f64) -> f64 {
        match self {
            Side::Long => (price - entry_price) / entry_price * 100.0,
            Side::Short => (entry_price - price) / entry_price * 100.0,
        }
    }

    /// Price `pct` percent in the profitable direction from `reference`
    pub fn favorable(&self, reference: f64, pct: f64) -> f64 {
        match self {
            Side::Long => reference * (1.0 + pct / 100.0),
            Side::Short => reference * (1.0 - pct / 100.0),
        }
    }

    /// Price `pct` percent in the losing direction from `reference`
    pub fn adverse(&self, reference: f64, pct: f64) -> f64 {
        self.favorable(reference, -pct)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Individual sub-signal votes, each in {-1, 0, +1}
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubSignals {
    pub rsi: i8,
    pub macd: i8,
    pub bollinger: i8,
    pub trend: i8,
}

impl SubSignals {
    /// Number of sub-signals voting for `vote` (+1 or -1)
    pub fn count(&self, vote: i8) -> usize {
        [self.rsi, self.macd, self.bollinger, self.trend]
            .iter()
            .filter(|v| **v == vote)
            .count()
    }
}

/// Scored decision for one instrument and timeframe
///
/// Read-only once emitted. The next evaluation supersedes it with a new value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub instrument: String,
    pub timeframe: Timeframe,
    pub direction: Direction,
    pub base_confidence: f64,
    pub adjusted_confidence: f64, // capped at 98
    pub sub_signals: SubSignals,
    pub trend: TrendClassification,
    pub price_change: f64,  // fractional change vs previous close
    pub volume_change: f64, // fractional change vs previous volume
    pub snapshot: IndicatorSnapshot,
    pub generated_at: DateTime<Utc>,
}

impl Signal {
    pub fn is_actionable(&self) -> bool {
        self.direction != Direction::Hold
    }

    /// Copy of this signal carrying a new adjusted confidence
    pub fn with_adjusted_confidence(&self, adjusted: f64) -> Signal {
        Signal {
            adjusted_confidence: adjusted.clamp(0.0, 98.0),
            ..self.clone()
        }
    }
}

/// Staged profit target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeProfitTier {
    pub target_pct: f64,
    pub target_price: f64,
    /// Stop-loss level to ratchet to when hit. `None` for the final tier,
    /// which closes the position instead.
    pub protect_price: Option<f64>,
    pub hit: bool,
}

/// Open speculative position on one instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub instrument: String,
    pub timeframe: Timeframe,
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub stop_loss: f64,
    pub trailing_stop: Option<f64>, // None until activated
    pub tiers: Vec<TakeProfitTier>,
    pub highest_price: f64,
    pub lowest_price: f64,
    pub signal: Signal,
}

impl Position {
    pub fn unrealized_pct(&self, price: f64) -> f64 {
        self.side.pnl_pct(self.entry_price, price)
    }

    /// Best unrealized profit seen since entry
    pub fn peak_profit_pct(&self) -> f64 {
        match self.side {
            Side::Long => self.side.pnl_pct(self.entry_price, self.highest_price),
            Side::Short => self.side.pnl_pct(self.entry_price, self.lowest_price),
        }
    }

    /// Tightest of the fixed and trailing stop
    pub fn effective_stop(&self) -> f64 {
        match (self.side, self.trailing_stop) {
            (Side::Long, Some(trailing)) => self.stop_loss.max(trailing),
            (Side::Short, Some(trailing)) => self.stop_loss.min(trailing),
            (_, None) => self.stop_loss,
        }
    }

    pub fn tiers_hit(&self) -> usize {
        self.tiers.iter().filter(|t| t.hit).count()
    }

    pub fn final_tier(&self) -> Option<&TakeProfitTier> {
        self.tiers.last()
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitReason {
    StopLoss,
    TrailingStop,
    TakeProfit,
    TrendWeakening,
    TrendReversal,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop-loss",
            ExitReason::TrailingStop => "trailing-stop",
            ExitReason::TakeProfit => "take-profit",
            ExitReason::TrendWeakening => "trend weakening",
            ExitReason::TrendReversal => "trend reversal",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable record of a finished position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub id: Uuid,
    pub instrument: String,
    pub timeframe: Timeframe,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub profit_loss_pct: f64,
    pub exit_reason: ExitReason,
    pub entry_confidence: f64,
    pub entry_trend: TrendClassification,
    pub entry_price_change: f64,
    pub entry_volume_change: f64,
    pub entry_snapshot: IndicatorSnapshot,
}

impl ClosedTrade {
    pub fn is_win(&self) -> bool {
        self.profit_loss_pct > 0.0
    }

    pub fn holding_time(&self) -> chrono::Duration {
        self.exit_time - self.entry_time
    }
}
