use crate::models::{
    Direction, IndicatorSnapshot, Signal, SubSignals, Timeframe, TrendClassification,
};
use serde::Deserialize;

/// Configuration for signal scoring
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub rsi_oversold: f64,
    pub rsi_recovering: f64, // below this and rising still counts as a buy vote
    pub rsi_overbought: f64,
    pub rsi_weakening: f64, // above this and falling still counts as a sell vote
    pub bb_tolerance: f64,  // fraction of the band price may sit inside and still vote
    pub confidence_floor: f64,
    pub confirmation_bonus: f64, // per confirming sub-signal
    pub adx_trend_threshold: f64,
    pub trend_strength_bonus: f64,
    pub volume_surge_threshold: f64, // fractional volume change, 0.5 = +50%
    pub volume_bonus: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            rsi_oversold: 30.0,
            rsi_recovering: 35.0,
            rsi_overbought: 70.0,
            rsi_weakening: 65.0,
            bb_tolerance: 0.02,
            confidence_floor: 70.0,
            confirmation_bonus: 5.0,
            adx_trend_threshold: 25.0,
            trend_strength_bonus: 10.0,
            volume_surge_threshold: 0.5,
            volume_bonus: 5.0,
        }
    }
}

/// Classify trend from price against the 20 and 50 period SMAs
pub fn classify_trend(snapshot: &IndicatorSnapshot) -> TrendClassification {
    let (price, ma20, ma50) = (snapshot.close, snapshot.sma_20, snapshot.sma_50);
    if !(price.is_finite() && ma20.is_finite() && ma50.is_finite()) || ma20 <= 0.0 || ma50 <= 0.0
    {
        return TrendClassification::Unknown;
    }

    if price > ma20 && ma20 > ma50 {
        TrendClassification::Up
    } else if price < ma20 && ma20 < ma50 {
        TrendClassification::Down
    } else {
        TrendClassification::Sideways
    }
}

/// Fractional change from `previous` to `current`, 0.0 when undefined
fn fractional_change(previous: f64, current: f64) -> f64 {
    if previous == 0.0 {
        return 0.0;
    }
    let change = (current - previous) / previous;
    if change.is_finite() {
        change
    } else {
        0.0
    }
}

/// Turns indicator snapshots into directional signals
///
/// Scoring is a pure function of the current and previous snapshot.
#[derive(Debug, Clone, Default)]
pub struct SignalScorer {
    config: SignalConfig,
}

impl SignalScorer {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Score the latest snapshot against its predecessor
    ///
    /// Without a previous snapshot there are no deltas to work with, so the
    /// result is Hold with confidence 0.
    pub fn score(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        snapshot: &IndicatorSnapshot,
        previous: Option<&IndicatorSnapshot>,
    ) -> Signal {
        let trend = classify_trend(snapshot);

        let Some(previous) = previous else {
            return Signal {
                instrument: instrument.to_string(),
                timeframe,
                direction: Direction::Hold,
                base_confidence: 0.0,
                adjusted_confidence: 0.0,
                sub_signals: SubSignals::default(),
                trend,
                price_change: 0.0,
                volume_change: 0.0,
                snapshot: snapshot.clone(),
                generated_at: snapshot.timestamp,
            };
        };

        let sub_signals = SubSignals {
            rsi: self.rsi_vote(snapshot, previous),
            macd: Self::macd_vote(snapshot, previous),
            bollinger: self.bollinger_vote(snapshot, previous),
            trend: Self::trend_vote(trend),
        };

        let direction = Self::decide(&sub_signals);
        let volume_change = fractional_change(previous.volume, snapshot.volume);
        let price_change = fractional_change(previous.close, snapshot.close);

        let base_confidence = match direction {
            Direction::Hold => 0.0,
            Direction::Buy => self.confidence(sub_signals.count(1), snapshot, volume_change),
            Direction::Sell => self.confidence(sub_signals.count(-1), snapshot, volume_change),
        };

        tracing::debug!(
            "{} {} sub-signals rsi={} macd={} bb={} trend={} ({}) -> {} @ {:.0}",
            instrument,
            timeframe,
            sub_signals.rsi,
            sub_signals.macd,
            sub_signals.bollinger,
            sub_signals.trend,
            trend.as_str(),
            direction,
            base_confidence
        );

        Signal {
            instrument: instrument.to_string(),
            timeframe,
            direction,
            base_confidence,
            adjusted_confidence: base_confidence.min(98.0),
            sub_signals,
            trend,
            price_change,
            volume_change,
            snapshot: snapshot.clone(),
            generated_at: snapshot.timestamp,
        }
    }

    /// Score the newest snapshot of an oldest-first series
    pub fn score_latest(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        snapshots: &[IndicatorSnapshot],
    ) -> Option<Signal> {
        let (latest, rest) = snapshots.split_last()?;
        Some(self.score(instrument, timeframe, latest, rest.last()))
    }

    fn rsi_vote(&self, snap: &IndicatorSnapshot, prev: &IndicatorSnapshot) -> i8 {
        let c = &self.config;
        let rising = snap.rsi > prev.rsi;
        let falling = snap.rsi < prev.rsi;

        if snap.rsi < c.rsi_oversold || (snap.rsi < c.rsi_recovering && rising) {
            1
        } else if snap.rsi > c.rsi_overbought || (snap.rsi > c.rsi_weakening && falling) {
            -1
        } else {
            0
        }
    }

    fn macd_vote(snap: &IndicatorSnapshot, prev: &IndicatorSnapshot) -> i8 {
        if snap.macd > snap.macd_signal && snap.macd > prev.macd {
            1
        } else if snap.macd < snap.macd_signal && snap.macd < prev.macd {
            -1
        } else {
            0
        }
    }

    fn bollinger_vote(&self, snap: &IndicatorSnapshot, prev: &IndicatorSnapshot) -> i8 {
        let tol = self.config.bb_tolerance;
        let price = snap.close;

        if price < snap.bb_lower || (price < snap.bb_lower * (1.0 + tol) && price > prev.close) {
            1
        } else if price > snap.bb_upper
            || (price > snap.bb_upper * (1.0 - tol) && price < prev.close)
        {
            -1
        } else {
            0
        }
    }

    fn trend_vote(trend: TrendClassification) -> i8 {
        match trend {
            TrendClassification::Up => 1,
            TrendClassification::Down => -1,
            _ => 0,
        }
    }

    fn decide(subs: &SubSignals) -> Direction {
        let buy = (subs.rsi == 1 && (subs.macd == 1 || subs.bollinger == 1))
            || (subs.macd == 1 && subs.bollinger == 1 && subs.trend == 1);
        let sell = (subs.rsi == -1 && (subs.macd == -1 || subs.bollinger == -1))
            || (subs.macd == -1 && subs.bollinger == -1 && subs.trend == -1);

        match (buy, sell) {
            (true, false) => Direction::Buy,
            (false, true) => Direction::Sell,
            _ => Direction::Hold,
        }
    }

    fn confidence(&self, confirmations: usize, snap: &IndicatorSnapshot, volume_change: f64) -> f64 {
        let c = &self.config;
        let mut confidence = c.confidence_floor + c.confirmation_bonus * confirmations as f64;

        if snap.adx > c.adx_trend_threshold {
            confidence += c.trend_strength_bonus;
        }
        if volume_change > c.volume_surge_threshold {
            confidence += c.volume_bonus;
        }

        confidence.clamp(0.0, 100.0)
    }
}
