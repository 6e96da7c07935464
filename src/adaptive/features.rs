use crate::models::{ClosedTrade, IndicatorSnapshot, Signal, TrendClassification};
use serde::{Deserialize, Serialize};

pub const FEATURE_COUNT: usize = 8;

/// Indicator-derived features describing the market at entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn new(
        snapshot: &IndicatorSnapshot,
        trend: TrendClassification,
        price_change: f64,
        volume_change: f64,
    ) -> Self {
        let raw = [
            snapshot.rsi,
            snapshot.macd,
            snapshot.macd_signal,
            snapshot.bollinger_position(),
            trend.as_score(),
            volume_change,
            price_change,
            snapshot.adx,
        ];
        // Non-finite inputs would poison training
        Self(raw.map(|v| if v.is_finite() { v } else { 0.0 }))
    }

    pub fn from_signal(signal: &Signal) -> Self {
        Self::new(
            &signal.snapshot,
            signal.trend,
            signal.price_change,
            signal.volume_change,
        )
    }

    pub fn from_trade(trade: &ClosedTrade) -> Self {
        Self::new(
            &trade.entry_snapshot,
            trade.entry_trend,
            trade.entry_price_change,
            trade.entry_volume_change,
        )
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::neutral_snapshot;

    #[test]
    fn test_feature_layout() {
        let mut snap = neutral_snapshot(100.0);
        snap.rsi = 42.0;
        snap.adx = 27.0;
        let features = FeatureVector::new(&snap, TrendClassification::Down, 0.01, 0.3);

        assert_eq!(features.values()[0], 42.0);
        assert_eq!(features.values()[3], 0.5); // close sits on the middle band
        assert_eq!(features.values()[4], -1.0);
        assert_eq!(features.values()[5], 0.3);
        assert_eq!(features.values()[7], 27.0);
    }

    #[test]
    fn test_non_finite_inputs_are_zeroed() {
        let snap = neutral_snapshot(100.0);
        let features = FeatureVector::new(&snap, TrendClassification::Up, f64::NAN, f64::INFINITY);
        assert_eq!(features.values()[5], 0.0);
        assert_eq!(features.values()[6], 0.0);
    }
}
