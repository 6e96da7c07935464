use crate::execution::PositionSlot;
use crate::models::{normalize_instrument, Signal, Timeframe};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use tokio::sync::Mutex;

/// Everything the monitor keeps for one instrument
#[derive(Debug)]
pub struct InstrumentState {
    pub slot: PositionSlot,
    /// Timestamp of the newest snapshot evaluated, per timeframe
    pub last_evaluated: HashMap<Timeframe, DateTime<Utc>>,
    pub latest_signal: Option<Signal>,
}

impl InstrumentState {
    pub fn new(instrument: &str) -> Self {
        Self {
            slot: PositionSlot::new(instrument),
            last_evaluated: HashMap::new(),
            latest_signal: None,
        }
    }
}

/// Injectable per-instrument state store
///
/// The map lock is only held to look up or insert an entry; evaluation
/// serializes on the entry's own async mutex. In-flight claims are per
/// (instrument, timeframe), so timeframes of one instrument never drop
/// each other's cycles.
#[derive(Debug, Default)]
pub struct InstrumentStates {
    inner: RwLock<HashMap<String, Arc<Mutex<InstrumentState>>>>,
    in_flight: StdMutex<HashSet<(String, Timeframe)>>,
}

/// Marks an (instrument, timeframe) evaluation as running until dropped
#[derive(Debug)]
pub struct EvaluationClaim {
    states: Arc<InstrumentStates>,
    key: (String, Timeframe),
}

impl Drop for EvaluationClaim {
    fn drop(&mut self) {
        let mut in_flight = self.states.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.key);
    }
}

impl InstrumentStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, instrument: &str) -> Arc<Mutex<InstrumentState>> {
        let key = normalize_instrument(instrument);
        if let Some(state) = self.get(&key) {
            return state;
        }
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(InstrumentState::new(&key))))
            .clone()
    }

    pub fn get(&self, instrument: &str) -> Option<Arc<Mutex<InstrumentState>>> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(&normalize_instrument(instrument)).cloned()
    }

    /// Claim an evaluation slot; None while one is already running
    pub fn claim(self: &Arc<Self>, instrument: &str, timeframe: Timeframe) -> Option<EvaluationClaim> {
        let key = (normalize_instrument(instrument), timeframe);
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(key.clone()) {
            return None;
        }
        Some(EvaluationClaim {
            states: Arc::clone(self),
            key,
        })
    }

    pub fn instruments(&self) -> Vec<String> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        names
    }
}
