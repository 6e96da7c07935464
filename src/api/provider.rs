use crate::error::TradingError;
use crate::indicators::{build_snapshots, IndicatorParams};
use crate::models::{normalize_instrument, Candle, IndicatorSnapshot, Timeframe};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

/// Anything that can hand out closed candles, oldest first
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn candles(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, TradingError>;
}

/// Latest snapshots for one instrument, oldest first, never empty
#[derive(Debug, Clone)]
pub struct SnapshotWindow {
    pub instrument: String,
    pub timeframe: Timeframe,
    snapshots: Vec<IndicatorSnapshot>,
}

impl SnapshotWindow {
    pub fn new(
        instrument: impl Into<String>,
        timeframe: Timeframe,
        snapshots: Vec<IndicatorSnapshot>,
    ) -> Option<Self> {
        if snapshots.is_empty() {
            return None;
        }
        Some(Self {
            instrument: instrument.into(),
            timeframe,
            snapshots,
        })
    }

    pub fn latest(&self) -> &IndicatorSnapshot {
        &self.snapshots[self.snapshots.len() - 1]
    }

    pub fn previous(&self) -> Option<&IndicatorSnapshot> {
        self.snapshots.iter().rev().nth(1)
    }

    pub fn snapshots(&self) -> &[IndicatorSnapshot] {
        &self.snapshots
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnavailableReason {
    Network(String),
    InsufficientHistory { have: usize, need: usize },
    Computation(String),
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::Network(e) => write!(f, "fetch failed: {}", e),
            UnavailableReason::InsufficientHistory { have, need } => {
                write!(f, "insufficient history ({} of {} candles)", have, need)
            }
            UnavailableReason::Computation(e) => write!(f, "indicator error: {}", e),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SnapshotFetch {
    Available(SnapshotWindow),
    Unavailable(UnavailableReason),
}

/// Source of indicator snapshots for the latest closed interval
///
/// Never fails: every problem is reported as `Unavailable`.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn fetch(&self, instrument: &str, timeframe: Timeframe) -> SnapshotFetch;
}

/// Turns a candle source into a snapshot provider
pub struct CandleSnapshotProvider<S> {
    source: S,
    params: IndicatorParams,
    window: usize,
    history: usize,
}

impl<S: CandleSource> CandleSnapshotProvider<S> {
    pub fn new(source: S) -> Self {
        Self::with_params(source, IndicatorParams::default())
    }

    pub fn with_params(source: S, params: IndicatorParams) -> Self {
        Self {
            source,
            params,
            window: 6, // latest plus the four candle moves used by weakness scoring
            history: 200,
        }
    }

    /// Number of candles requested per fetch
    pub fn with_history(mut self, history: usize) -> Self {
        self.history = history;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

#[async_trait]
impl<S: CandleSource> SnapshotProvider for CandleSnapshotProvider<S> {
    async fn fetch(&self, instrument: &str, timeframe: Timeframe) -> SnapshotFetch {
        let candles = match self.source.candles(instrument, timeframe, self.history).await {
            Ok(candles) => candles,
            Err(e) => return SnapshotFetch::Unavailable(UnavailableReason::Network(e.to_string())),
        };

        match build_snapshots(&candles, self.window, &self.params) {
            Ok(snapshots) => match SnapshotWindow::new(instrument, timeframe, snapshots) {
                Some(window) => SnapshotFetch::Available(window),
                None => SnapshotFetch::Unavailable(UnavailableReason::InsufficientHistory {
                    have: candles.len(),
                    need: self.params.min_candles,
                }),
            },
            Err(TradingError::InsufficientHistory { have, need }) => {
                SnapshotFetch::Unavailable(UnavailableReason::InsufficientHistory { have, need })
            }
            Err(e) => SnapshotFetch::Unavailable(UnavailableReason::Computation(e.to_string())),
        }
    }
}

struct ReplaySeries {
    candles: Vec<Candle>,
    visible: usize,
}

/// In-memory candle source with a per-series cursor
///
/// Only the first `visible` candles of a series are served, so a replay can
/// reveal history one closed candle at a time.
#[derive(Default)]
pub struct ReplayCandleSource {
    series: RwLock<HashMap<(String, Timeframe), ReplaySeries>>,
}

impl ReplayCandleSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a series; `visible` candles are served immediately
    pub fn insert(&self, instrument: &str, timeframe: Timeframe, candles: Vec<Candle>, visible: usize) {
        let visible = visible.min(candles.len());
        let mut series = self.series.write().unwrap_or_else(|e| e.into_inner());
        series.insert(
            (normalize_instrument(instrument), timeframe),
            ReplaySeries { candles, visible },
        );
    }

    /// Reveal the next candle; false once the series is exhausted
    pub fn advance(&self, instrument: &str, timeframe: Timeframe) -> bool {
        let mut series = self.series.write().unwrap_or_else(|e| e.into_inner());
        match series.get_mut(&(normalize_instrument(instrument), timeframe)) {
            Some(s) if s.visible < s.candles.len() => {
                s.visible += 1;
                true
            }
            _ => false,
        }
    }

    pub fn visible(&self, instrument: &str, timeframe: Timeframe) -> usize {
        let series = self.series.read().unwrap_or_else(|e| e.into_inner());
        series
            .get(&(normalize_instrument(instrument), timeframe))
            .map(|s| s.visible)
            .unwrap_or(0)
    }
}

#[async_trait]
impl CandleSource for ReplayCandleSource {
    async fn candles(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, TradingError> {
        let series = self.series.read().unwrap_or_else(|e| e.into_inner());
        let s = series
            .get(&(normalize_instrument(instrument), timeframe))
            .ok_or_else(|| TradingError::DataUnavailable {
                instrument: instrument.to_string(),
                reason: format!("no {} series loaded", timeframe),
            })?;
        let start = s.visible.saturating_sub(limit);
        Ok(s.candles[start..s.visible].to_vec())
    }
}

#[async_trait]
impl<T: CandleSource + ?Sized> CandleSource for std::sync::Arc<T> {
    async fn candles(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, TradingError> {
        (**self).candles(instrument, timeframe, limit).await
    }
}
