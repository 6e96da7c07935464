use super::state::{InstrumentState, InstrumentStates};
use crate::adaptive::{AdaptiveConfidenceModel, AdaptiveConfig};
use crate::api::{SnapshotFetch, SnapshotProvider, UnavailableReason};
use crate::config::AppConfig;
use crate::error::TradingError;
use crate::execution::{EntrySkip, PositionConfig, PositionEvent, PositionManager, PositionUpdate};
use crate::ledger::{LedgerStatistics, TradeLedger};
use crate::models::{
    normalize_instrument, ClosedTrade, IndicatorSnapshot, Position, Signal, Timeframe,
};
use crate::notify::{messages, Notifier};
use crate::strategy::{SignalConfig, SignalScorer};
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Why an evaluation did nothing
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Another evaluation of this instrument is still running
    Overlap,
    DataUnavailable(UnavailableReason),
    /// Latest snapshot was already evaluated
    NoNewData,
}

/// What one evaluation cycle did
#[derive(Debug, Clone)]
pub enum EvaluationOutcome {
    Skipped(SkipReason),
    Held {
        signal: Signal,
        unrealized_pct: f64,
        events: Vec<PositionEvent>,
    },
    Opened {
        signal: Signal,
        position: Position,
    },
    Closed {
        signal: Signal,
        trade: ClosedTrade,
    },
    NoEntry {
        signal: Signal,
        reason: EntrySkip,
    },
}

impl EvaluationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            EvaluationOutcome::Skipped(_) => "skipped",
            EvaluationOutcome::Held { .. } => "held",
            EvaluationOutcome::Opened { .. } => "opened",
            EvaluationOutcome::Closed { .. } => "closed",
            EvaluationOutcome::NoEntry { .. } => "no-entry",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub signals: SignalConfig,
    pub position: PositionConfig,
    pub adaptive: AdaptiveConfig,
    /// Performance summary every N closed trades (0 disables)
    pub summary_every: usize,
}

impl From<&AppConfig> for EngineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            signals: config.signals.clone(),
            position: config.position.clone(),
            adaptive: config.adaptive.clone(),
            summary_every: config.telegram.summary_every,
        }
    }
}

/// Evaluates instruments: fetch, score, manage the position, learn from exits
///
/// Per-instrument state is serialized by that instrument's mutex. The ledger
/// and the confidence model are shared by all instruments behind their own
/// process-wide locks.
pub struct Engine {
    provider: Arc<dyn SnapshotProvider>,
    scorer: SignalScorer,
    positions: PositionManager,
    model: Arc<RwLock<AdaptiveConfidenceModel>>,
    ledger: Arc<Mutex<TradeLedger>>,
    notifier: Arc<dyn Notifier>,
    states: Arc<InstrumentStates>,
    summary_every: usize,
}

impl Engine {
    /// Build an engine, replaying the ledger history into the confidence model
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        ledger: TradeLedger,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Result<Self, TradingError> {
        Self::with_states(provider, ledger, notifier, config, Arc::new(InstrumentStates::new()))
    }

    pub fn with_states(
        provider: Arc<dyn SnapshotProvider>,
        ledger: TradeLedger,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
        states: Arc<InstrumentStates>,
    ) -> Result<Self, TradingError> {
        let mut model = AdaptiveConfidenceModel::new(config.adaptive);
        model.rebuild_from(ledger.trades())?;
        tracing::info!(
            "🧠 Confidence model rebuilt from {} ledger trades (active: {})",
            model.total_recorded(),
            model.is_active()
        );

        Ok(Self {
            provider,
            scorer: SignalScorer::new(config.signals),
            positions: PositionManager::new(config.position),
            model: Arc::new(RwLock::new(model)),
            ledger: Arc::new(Mutex::new(ledger)),
            notifier,
            states,
            summary_every: config.summary_every,
        })
    }

    pub fn states(&self) -> &Arc<InstrumentStates> {
        &self.states
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn model(&self) -> &Arc<RwLock<AdaptiveConfidenceModel>> {
        &self.model
    }

    /// Run one evaluation cycle for an instrument on a timeframe
    ///
    /// An overlapping call for the same instrument and timeframe returns
    /// immediately with `Skipped(Overlap)` instead of waiting. The fetch runs
    /// outside the instrument lock; only scoring and position updates hold it.
    pub async fn evaluate(
        &self,
        instrument: &str,
        timeframe: Timeframe,
    ) -> Result<EvaluationOutcome, TradingError> {
        let instrument = normalize_instrument(instrument);
        let Some(_claim) = self.states.claim(&instrument, timeframe) else {
            tracing::debug!("⏭️  {} {} still evaluating, dropping overlap", instrument, timeframe);
            return Ok(EvaluationOutcome::Skipped(SkipReason::Overlap));
        };

        let window = match self.provider.fetch(&instrument, timeframe).await {
            SnapshotFetch::Available(window) => window,
            SnapshotFetch::Unavailable(reason) => {
                tracing::warn!("⚠️  {} {}: {}", instrument, timeframe, reason);
                return Ok(EvaluationOutcome::Skipped(SkipReason::DataUnavailable(reason)));
            }
        };

        let state = self.states.get_or_create(&instrument);
        let mut guard = state.lock().await;

        let latest = window.latest();
        let last_seen = guard.last_evaluated.get(&timeframe).copied();
        if last_seen.is_some_and(|last| last >= latest.timestamp) {
            return Ok(EvaluationOutcome::Skipped(SkipReason::NoNewData));
        }

        let scored = self
            .scorer
            .score(&instrument, timeframe, latest, window.previous());
        let adjustment = {
            let model = self.model.read().unwrap_or_else(|e| e.into_inner());
            model.adjust(&scored)
        };
        let signal = scored.with_adjusted_confidence(adjustment.adjusted);

        guard.last_evaluated.insert(timeframe, latest.timestamp);
        guard.latest_signal = Some(signal.clone());

        tracing::debug!(
            "{} {} {} base {:.1} adjusted {:.1} (RSI {:.1}, ADX {:.1})",
            instrument,
            timeframe,
            signal.direction,
            signal.base_confidence,
            signal.adjusted_confidence,
            latest.rsi,
            latest.adx
        );

        // An open position is managed first and suppresses entries this cycle
        if let Some(position_tf) = guard.slot.position().map(|p| p.timeframe) {
            if position_tf != timeframe {
                return Ok(EvaluationOutcome::NoEntry {
                    signal,
                    reason: EntrySkip::AlreadyOpen,
                });
            }
            return self
                .manage_open(&mut guard, signal, window.snapshots(), last_seen)
                .await;
        }

        if let Err(reason) = self
            .positions
            .entry_decision(&guard.slot, &signal, latest.timestamp)
        {
            if signal.is_actionable() {
                tracing::info!(
                    "🔕 {} {} {} not taken: {}",
                    instrument,
                    timeframe,
                    signal.direction,
                    reason
                );
            }
            return Ok(EvaluationOutcome::NoEntry { signal, reason });
        }

        let position = self.positions.open_position(&mut guard.slot, &signal)?.clone();
        self.notifier
            .notify(&messages::entry_message(&signal, &position, &adjustment))
            .await;

        Ok(EvaluationOutcome::Opened { signal, position })
    }

    /// Walk the open position through every snapshot it has not seen yet
    ///
    /// Snapshots are replayed oldest first, each with the history up to
    /// itself, so a stop breached between two polls still closes the
    /// position at that candle.
    async fn manage_open(
        &self,
        state: &mut InstrumentState,
        signal: Signal,
        history: &[IndicatorSnapshot],
        last_seen: Option<DateTime<Utc>>,
    ) -> Result<EvaluationOutcome, TradingError> {
        let entry_time = state.slot.position().map(|p| p.entry_time);
        let latest = history.len().saturating_sub(1);
        let start = match last_seen {
            Some(last) => history
                .iter()
                .position(|s| s.timestamp > last && entry_time.map_or(true, |e| s.timestamp > e))
                .unwrap_or(latest),
            None => latest,
        };
        if start == 0 && history.len() > 1 {
            tracing::warn!(
                "⚠️  {} missed more candles than one window holds, catching up from {}",
                state.slot.instrument(),
                history[0].timestamp
            );
        }

        let mut events = Vec::new();
        let mut unrealized_pct = 0.0;
        for end in start..history.len() {
            match self.positions.evaluate(&mut state.slot, &history[..=end])? {
                PositionUpdate::Held {
                    events: new_events,
                    unrealized_pct: pct,
                } => {
                    if let Some(position) = state.slot.position() {
                        for event in &new_events {
                            if let Some(text) = messages::position_event_message(position, event) {
                                self.notifier.notify(&text).await;
                            }
                        }
                    }
                    events.extend(new_events);
                    unrealized_pct = pct;
                }
                PositionUpdate::Closed(trade) => {
                    self.record_close(&trade).await;
                    return Ok(EvaluationOutcome::Closed { signal, trade });
                }
                PositionUpdate::Flat => {
                    return Ok(EvaluationOutcome::NoEntry {
                        signal,
                        reason: EntrySkip::Hold,
                    })
                }
            }
        }

        Ok(EvaluationOutcome::Held {
            signal,
            unrealized_pct,
            events,
        })
    }

    /// Ledger append, model update and exit notifications for a closed trade
    ///
    /// A failed ledger write keeps the trade in memory and alerts the
    /// operator; the model still learns from it.
    async fn record_close(&self, trade: &ClosedTrade) {
        let (persisted, total, overall) = {
            let mut ledger = self.ledger.lock().await;
            let persisted = ledger.append(trade.clone()).await;
            (persisted, ledger.len(), ledger.overall_statistics())
        };

        {
            let mut model = self.model.write().unwrap_or_else(|e| e.into_inner());
            model.record_outcome(trade);
        }

        self.notifier.notify(&messages::exit_message(trade)).await;

        if let Err(e) = persisted {
            tracing::error!("💾 {}", e);
            self.notifier
                .notify(&messages::operator_alert(
                    &format!("ledger write failed for {}", trade.instrument),
                    &e.to_string(),
                ))
                .await;
        }

        if self.summary_every > 0 && total % self.summary_every == 0 {
            self.notifier
                .notify(&messages::performance_summary(&overall))
                .await;
        }
    }

    /// Fit a new classifier off the hot path if one is due
    ///
    /// The model lock is held only to copy the training set and to swap in
    /// the result; fitting runs on the blocking pool.
    pub async fn retrain_once(&self) -> Result<bool, TradingError> {
        let job = {
            let mut model = self.model.write().unwrap_or_else(|e| e.into_inner());
            model.take_training_job()
        };
        let Some(job) = job else {
            return Ok(false);
        };

        let samples = job.sample_count();
        let trained = tokio::task::spawn_blocking(move || job.run())
            .await
            .map_err(|e| TradingError::Computation(format!("retrain task failed: {}", e)))??;

        let mut model = self.model.write().unwrap_or_else(|e| e.into_inner());
        model.install(trained);
        tracing::debug!("Retrain finished on {} samples", samples);
        Ok(true)
    }

    /// Background task that retrains on a fixed cadence
    pub fn spawn_retrainer(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = engine.retrain_once().await {
                    tracing::warn!("⚠️  Retrain failed: {}", e);
                }
            }
        })
    }

    pub async fn latest_signal(&self, instrument: &str) -> Option<Signal> {
        let state = self.states.get(instrument)?;
        let guard = state.lock().await;
        guard.latest_signal.clone()
    }

    pub async fn open_position(&self, instrument: &str) -> Option<Position> {
        let state = self.states.get(instrument)?;
        let guard = state.lock().await;
        guard.slot.position().cloned()
    }

    pub async fn statistics(&self, instrument: Option<&str>) -> LedgerStatistics {
        let mut ledger = self.ledger.lock().await;
        match instrument {
            Some(i) => ledger.statistics(&normalize_instrument(i)),
            None => ledger.overall_statistics(),
        }
    }

    pub async fn closed_trades(&self) -> Vec<ClosedTrade> {
        self.ledger.lock().await.trades().to_vec()
    }

    pub async fn pending_ledger_writes(&self) -> usize {
        self.ledger.lock().await.pending_writes()
    }
}
