use super::engine::{Engine, EvaluationOutcome, SkipReason};
use crate::models::{normalize_instrument, Timeframe};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct MonitorTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// One polling task per (instrument, timeframe)
///
/// Stopping signals the task between cycles; an evaluation already in
/// progress always runs to completion.
pub struct Scheduler {
    engine: Arc<Engine>,
    poll_interval: Duration,
    tasks: Mutex<HashMap<(String, Timeframe), MonitorTask>>,
    /// Signalled tasks that may still be finishing an evaluation
    stopping: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>, poll_interval: Duration) -> Self {
        Self {
            engine,
            poll_interval,
            tasks: Mutex::new(HashMap::new()),
            stopping: Mutex::new(Vec::new()),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Start monitoring; false if this pair is already running
    pub fn start(&self, instrument: &str, timeframe: Timeframe) -> bool {
        let instrument = normalize_instrument(instrument);
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let key = (instrument.clone(), timeframe);

        if let Some(task) = tasks.get(&key) {
            if !task.handle.is_finished() {
                return false;
            }
        }

        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_monitor(
            Arc::clone(&self.engine),
            instrument.clone(),
            timeframe,
            self.poll_interval,
            stop_rx,
        ));
        tasks.insert(key, MonitorTask { stop, handle });

        tracing::info!("▶️  Monitoring {} on {}", instrument, timeframe);
        true
    }

    /// Stop every timeframe of an instrument; returns how many tasks stopped
    pub fn stop_instrument(&self, instrument: &str) -> usize {
        let instrument = normalize_instrument(instrument);
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let keys: Vec<_> = tasks
            .keys()
            .filter(|(i, _)| *i == instrument)
            .cloned()
            .collect();

        for key in &keys {
            if let Some(task) = tasks.remove(key) {
                self.signal_stop(task);
                tracing::info!("⏹️  Stopped {} on {}", key.0, key.1);
            }
        }
        keys.len()
    }

    pub fn stop_all(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let count = tasks.len();
        for (_, task) in tasks.drain() {
            self.signal_stop(task);
        }
        if count > 0 {
            tracing::info!("⏹️  Stopped all {} monitors", count);
        }
        count
    }

    /// Stop every monitor and wait until in-flight evaluations have finished
    pub async fn shutdown(&self) -> usize {
        let count = self.stop_all();
        let handles: Vec<_> = {
            let mut stopping = self.stopping.lock().unwrap_or_else(|e| e.into_inner());
            stopping.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("⚠️  Monitor task ended abnormally: {}", e);
            }
        }
        count
    }

    fn signal_stop(&self, task: MonitorTask) {
        let _ = task.stop.send(true);
        let mut stopping = self.stopping.lock().unwrap_or_else(|e| e.into_inner());
        stopping.retain(|h| !h.is_finished());
        stopping.push(task.handle);
    }

    /// Running (instrument, timeframe) pairs, sorted
    pub fn active(&self) -> Vec<(String, Timeframe)> {
        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let mut active: Vec<_> = tasks
            .iter()
            .filter(|(_, t)| !t.handle.is_finished())
            .map(|(k, _)| k.clone())
            .collect();
        active.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.minutes().cmp(&b.1.minutes())));
        active
    }

    pub fn is_active(&self, instrument: &str) -> bool {
        let instrument = normalize_instrument(instrument);
        self.active().iter().any(|(i, _)| *i == instrument)
    }
}

async fn run_monitor(
    engine: Arc<Engine>,
    instrument: String,
    timeframe: Timeframe,
    poll_interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
                continue;
            }
        }

        // Errors stay with this instrument; the loop keeps polling
        match engine.evaluate(&instrument, timeframe).await {
            Ok(EvaluationOutcome::Opened { position, .. }) => tracing::info!(
                "✅ {} {} opened {} @ ${:.4}",
                instrument,
                timeframe,
                position.side,
                position.entry_price
            ),
            Ok(EvaluationOutcome::Closed { trade, .. }) => tracing::info!(
                "🏁 {} {} closed ({}): {:+.2}%",
                instrument,
                timeframe,
                trade.exit_reason,
                trade.profit_loss_pct
            ),
            Ok(EvaluationOutcome::Skipped(SkipReason::NoNewData)) => {}
            Ok(outcome) => {
                tracing::debug!("{} {}: {}", instrument, timeframe, outcome.label())
            }
            Err(e) => tracing::warn!("⚠️  {} {} evaluation failed: {}", instrument, timeframe, e),
        }
    }

    tracing::debug!("Monitor for {} {} exited", instrument, timeframe);
}
