use crate::models::{IndicatorSnapshot, TrendClassification};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RsiZone {
    Oversold,
    Neutral,
    Overbought,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdxZone {
    Weak,
    Moderate,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BandPosition {
    BelowLower,
    LowerHalf,
    UpperHalf,
    AboveUpper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacdTrend {
    Bullish,
    Bearish,
    Flat,
}

/// Discretised market state used to bucket trade outcomes
///
/// The text form is canonical: fields are always written in sorted key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatternKey {
    pub rsi: RsiZone,
    pub trend: TrendClassification,
    pub adx: AdxZone,
    pub bollinger: BandPosition,
    pub macd: MacdTrend,
}

impl PatternKey {
    pub fn from_snapshot(snapshot: &IndicatorSnapshot, trend: TrendClassification) -> Self {
        let rsi = if snapshot.rsi < 30.0 {
            RsiZone::Oversold
        } else if snapshot.rsi > 70.0 {
            RsiZone::Overbought
        } else {
            RsiZone::Neutral
        };

        let adx = if snapshot.adx > 25.0 {
            AdxZone::Strong
        } else if snapshot.adx >= 20.0 {
            AdxZone::Moderate
        } else {
            AdxZone::Weak
        };

        let bollinger = if snapshot.close < snapshot.bb_lower {
            BandPosition::BelowLower
        } else if snapshot.close > snapshot.bb_upper {
            BandPosition::AboveUpper
        } else if snapshot.close < snapshot.bb_middle {
            BandPosition::LowerHalf
        } else {
            BandPosition::UpperHalf
        };

        let macd = if snapshot.macd > snapshot.macd_signal {
            MacdTrend::Bullish
        } else if snapshot.macd < snapshot.macd_signal {
            MacdTrend::Bearish
        } else {
            MacdTrend::Flat
        };

        Self {
            rsi,
            trend,
            adx,
            bollinger,
            macd,
        }
    }

    /// (key, value) pairs sorted by key
    fn fields(&self) -> [(&'static str, &'static str); 5] {
        [
            ("adx", adx_name(self.adx)),
            ("bb", band_name(self.bollinger)),
            ("macd", macd_name(self.macd)),
            ("rsi", rsi_name(self.rsi)),
            ("trend", self.trend.as_str()),
        ]
    }
}

fn rsi_name(zone: RsiZone) -> &'static str {
    match zone {
        RsiZone::Oversold => "oversold",
        RsiZone::Neutral => "neutral",
        RsiZone::Overbought => "overbought",
    }
}

fn adx_name(zone: AdxZone) -> &'static str {
    match zone {
        AdxZone::Weak => "weak",
        AdxZone::Moderate => "moderate",
        AdxZone::Strong => "strong",
    }
}

fn band_name(pos: BandPosition) -> &'static str {
    match pos {
        BandPosition::BelowLower => "below_lower",
        BandPosition::LowerHalf => "lower_half",
        BandPosition::UpperHalf => "upper_half",
        BandPosition::AboveUpper => "above_upper",
    }
}

fn macd_name(trend: MacdTrend) -> &'static str {
    match trend {
        MacdTrend::Bullish => "bullish",
        MacdTrend::Bearish => "bearish",
        MacdTrend::Flat => "flat",
    }
}

impl fmt::Display for PatternKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        write!(f, "{}", parts.join(";"))
    }
}
