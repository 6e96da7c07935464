// Shared fixtures for unit tests

use crate::models::{IndicatorSnapshot, Timeframe};
use crate::strategy::SignalScorer;
use chrono::{DateTime, Duration, TimeZone, Utc};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Snapshot where no sub-signal votes and no bonus applies
pub fn neutral_snapshot(close: f64) -> IndicatorSnapshot {
    IndicatorSnapshot {
        timestamp: base_time(),
        close,
        volume: 1000.0,
        rsi: 50.0,
        macd: 0.0,
        macd_signal: 0.0,
        macd_histogram: 0.0,
        bb_upper: close * 1.05,
        bb_middle: close,
        bb_lower: close * 0.95,
        adx: 15.0,
        plus_di: 20.0,
        minus_di: 20.0,
        sma_20: close,
        sma_50: close,
        ema_9: close,
        ema_21: close,
        volatility: 1.0,
        volume_ratio: 1.0,
    }
}

/// Neutral snapshot `hours` after `base_time`
pub fn snapshot_at(close: f64, hours: i64) -> IndicatorSnapshot {
    let mut snap = neutral_snapshot(close);
    snap.timestamp = base_time() + Duration::hours(hours);
    snap
}

/// Previous/current pair that scores a strong buy (RSI 28 bounce off the
/// lower band, MACD rising, uptrend, ADX 30)
pub fn oversold_bounce(close: f64, hours: i64) -> (IndicatorSnapshot, IndicatorSnapshot) {
    let mut prev = snapshot_at(close * 0.995, hours - 1);
    prev.rsi = 26.0;
    prev.macd = 0.2;
    prev.macd_signal = 0.15;
    prev.macd_histogram = 0.05;

    let mut snap = snapshot_at(close, hours);
    snap.rsi = 28.0;
    snap.macd = 0.4;
    snap.macd_signal = 0.2;
    snap.macd_histogram = 0.2;
    snap.bb_lower = close / 1.01;
    snap.bb_middle = close * 1.03;
    snap.bb_upper = close * 1.07;
    snap.sma_20 = close * 0.995;
    snap.sma_50 = close * 0.98;
    snap.adx = 30.0;
    (prev, snap)
}

pub fn buy_signal(instrument: &str, close: f64, hours: i64) -> crate::models::Signal {
    let (prev, snap) = oversold_bounce(close, hours);
    SignalScorer::default().score(instrument, Timeframe::H1, &snap, Some(&prev))
}
