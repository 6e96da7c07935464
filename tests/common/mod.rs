#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use cryptotrader::api::{SnapshotFetch, SnapshotProvider, SnapshotWindow, UnavailableReason};
use cryptotrader::ledger::{JsonlTradeStore, TradeLedger, TradeStore};
use cryptotrader::models::{IndicatorSnapshot, Timeframe};
use cryptotrader::monitor::{Engine, EngineConfig};
use cryptotrader::notify::Notifier;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn snapshot_at(close: f64, hours: i64) -> IndicatorSnapshot {
    IndicatorSnapshot {
        timestamp: base_time() + Duration::hours(hours),
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

/// RSI 28 bouncing 1% off the lower band, MACD rising, uptrend, ADX 30
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

/// Same bounce without the trend-strength bonus (base confidence 90)
pub fn moderate_bounce(close: f64, hours: i64) -> (IndicatorSnapshot, IndicatorSnapshot) {
    let (prev, mut snap) = oversold_bounce(close, hours);
    snap.adx = 22.0;
    (prev, snap)
}

/// Provider serving hand-built snapshot series
#[derive(Default)]
pub struct ScriptedProvider {
    series: Mutex<HashMap<String, Vec<IndicatorSnapshot>>>,
    delay: Option<std::time::Duration>,
    fetches: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps first, so overlapping evaluations can be observed
    pub fn with_delay(delay: std::time::Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn push(&self, instrument: &str, snapshots: impl IntoIterator<Item = IndicatorSnapshot>) {
        let mut series = self.series.lock().unwrap();
        series
            .entry(instrument.to_string())
            .or_default()
            .extend(snapshots);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotProvider for ScriptedProvider {
    async fn fetch(&self, instrument: &str, timeframe: Timeframe) -> SnapshotFetch {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let snapshots = {
            let series = self.series.lock().unwrap();
            series.get(instrument).cloned().unwrap_or_default()
        };
        let start = snapshots.len().saturating_sub(6);
        match SnapshotWindow::new(instrument, timeframe, snapshots[start..].to_vec()) {
            Some(window) => SnapshotFetch::Available(window),
            None => SnapshotFetch::Unavailable(UnavailableReason::Network(
                "connection refused".to_string(),
            )),
        }
    }
}

/// Notifier that keeps every message
#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages().iter().filter(|m| m.contains(needle)).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) -> bool {
        self.messages.lock().unwrap().push(message.to_string());
        true
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

pub fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("cryptotrader-it-{}", uuid::Uuid::new_v4()))
}

pub async fn jsonl_ledger(dir: &PathBuf) -> TradeLedger {
    let store: Arc<dyn TradeStore> = Arc::new(JsonlTradeStore::new(dir, "trades"));
    TradeLedger::open(store).await.unwrap()
}

pub async fn engine_with(
    provider: Arc<ScriptedProvider>,
    notifier: Arc<RecordingNotifier>,
    ledger: TradeLedger,
    config: EngineConfig,
) -> Engine {
    Engine::new(provider, ledger, notifier, config).unwrap()
}
