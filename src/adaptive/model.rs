use super::classifier::{ConfidenceClassifier, LogisticRegression, TrainingReport, TrainingSample};
use super::features::FeatureVector;
use super::pattern::PatternKey;
use crate::error::TradingError;
use crate::models::{ClosedTrade, Signal};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Which boost formula turns base confidence into adjusted confidence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostMode {
    /// Bonus from pattern and instrument success rates
    #[default]
    Additive,
    /// Classifier probability rescaled to a multiplier
    Multiplicative,
}

/// Configuration for the adaptive confidence model
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    pub min_samples: u64,          // below this the model never adjusts
    pub retrain_interval: u64,     // retrain after this many new trades
    pub min_pattern_matches: usize, // pattern success needs this many trades
    pub boost_mode: BoostMode,
    pub max_bonus: f64,
    pub max_outcomes_per_key: usize,
    pub max_training_samples: usize,
    pub retrain_check_secs: u64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            min_samples: 50,
            retrain_interval: 10,
            min_pattern_matches: 5,
            boost_mode: BoostMode::Additive,
            max_bonus: 15.0,
            max_outcomes_per_key: 500,
            max_training_samples: 5000,
            retrain_check_secs: 30,
        }
    }
}

/// Result of adjusting one signal
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceAdjustment {
    pub mode: BoostMode,
    pub base: f64,
    pub adjusted: f64,
    pub active: bool, // false while below the sample threshold
    pub multiplier: f64,
    pub bonus: f64,
    pub pattern_success: f64,
    pub symbol_success: f64,
    pub probability: Option<f64>,
}

/// Snapshot of the training set handed to a background retrain
#[derive(Debug, Clone)]
pub struct TrainingJob<C> {
    classifier: C,
    samples: Vec<TrainingSample>,
    recorded_at: u64,
}

impl<C: ConfidenceClassifier> TrainingJob<C> {
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Fit the classifier. Runs without holding the model lock.
    pub fn run(mut self) -> Result<TrainedClassifier<C>, TradingError> {
        let report = self.classifier.fit(&self.samples)?;
        Ok(TrainedClassifier {
            classifier: self.classifier,
            report,
            recorded_at: self.recorded_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TrainedClassifier<C> {
    classifier: C,
    pub report: TrainingReport,
    recorded_at: u64,
}

/// Anything that can hand out an unfitted copy of itself for retraining
pub trait Retrainable: ConfidenceClassifier + Clone {
    fn fresh(&self) -> Self;
}

impl Retrainable for LogisticRegression {
    fn fresh(&self) -> Self {
        self.untrained()
    }
}

/// Per-instrument and per-pattern outcome history plus a trainable
/// classifier, used to adjust signal confidence
///
/// Outcome lists are bounded FIFO queues; the total recorded counter is
/// never reduced by eviction.
#[derive(Debug, Clone)]
pub struct AdaptiveConfidenceModel<C = LogisticRegression> {
    config: AdaptiveConfig,
    instrument_outcomes: HashMap<String, VecDeque<bool>>,
    pattern_outcomes: HashMap<PatternKey, VecDeque<bool>>,
    training: VecDeque<TrainingSample>,
    total_recorded: u64,
    trained_at: u64, // total_recorded when the current classifier was fitted
    retrain_due: bool,
    classifier: C,
}

impl AdaptiveConfidenceModel<LogisticRegression> {
    pub fn new(config: AdaptiveConfig) -> Self {
        Self::with_classifier(config, LogisticRegression::default())
    }
}

impl<C: Retrainable> AdaptiveConfidenceModel<C> {
    pub fn with_classifier(config: AdaptiveConfig, classifier: C) -> Self {
        Self {
            config,
            instrument_outcomes: HashMap::new(),
            pattern_outcomes: HashMap::new(),
            training: VecDeque::new(),
            total_recorded: 0,
            trained_at: 0,
            retrain_due: false,
            classifier,
        }
    }

    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    /// Whether enough trades have been recorded for the model to adjust
    pub fn is_active(&self) -> bool {
        self.total_recorded >= self.config.min_samples
    }

    pub fn is_retrain_due(&self) -> bool {
        self.retrain_due
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Fraction of profitable trades sharing this pattern, 0.5 with too few
    pub fn pattern_success_rate(&self, key: &PatternKey) -> f64 {
        match self.pattern_outcomes.get(key) {
            Some(outcomes) if outcomes.len() >= self.config.min_pattern_matches => {
                win_rate(outcomes)
            }
            _ => 0.5,
        }
    }

    /// Fraction of profitable trades on this instrument, 0.5 with none
    pub fn symbol_success_rate(&self, instrument: &str) -> f64 {
        match self.instrument_outcomes.get(instrument) {
            Some(outcomes) if !outcomes.is_empty() => win_rate(outcomes),
            _ => 0.5,
        }
    }

    /// Classifier probability rescaled from [0.5, 1.0] to [0.8, 1.2] and
    /// clamped to [0.5, 1.2]; 1.0 while inactive or unfitted
    pub fn model_multiplier(&self, features: &FeatureVector) -> (f64, Option<f64>) {
        if !self.is_active() {
            return (1.0, None);
        }
        match self.classifier.predict_proba(features) {
            Some(p) => ((0.8 + (p - 0.5) * 0.8).clamp(0.5, 1.2), Some(p)),
            None => (1.0, None),
        }
    }

    /// Additive bonus from pattern and instrument history; 0.0 while inactive
    pub fn additive_bonus(&self, pattern_success: f64, symbol_success: f64) -> f64 {
        if !self.is_active() {
            return 0.0;
        }
        let max = self.config.max_bonus;
        ((pattern_success - 0.6) * 20.0 + (symbol_success - 0.5) * 10.0).clamp(-max, max)
    }

    /// Adjust a signal's base confidence with the configured boost mode
    pub fn adjust(&self, signal: &Signal) -> ConfidenceAdjustment {
        let base = signal.base_confidence;
        let pattern = PatternKey::from_snapshot(&signal.snapshot, signal.trend);
        let pattern_success = self.pattern_success_rate(&pattern);
        let symbol_success = self.symbol_success_rate(&signal.instrument);
        let (multiplier, probability) =
            self.model_multiplier(&FeatureVector::from_signal(signal));
        let bonus = self.additive_bonus(pattern_success, symbol_success);

        let adjusted = if !signal.is_actionable() {
            base.min(98.0)
        } else {
            match self.config.boost_mode {
                BoostMode::Additive => (base + bonus).clamp(0.0, 98.0),
                BoostMode::Multiplicative => (base * multiplier).clamp(0.0, 98.0),
            }
        };

        tracing::debug!(
            "{} confidence {:.1} -> {:.1} ({:?}, pattern {} = {:.2}, symbol = {:.2}, x{:.2})",
            signal.instrument,
            base,
            adjusted,
            self.config.boost_mode,
            pattern,
            pattern_success,
            symbol_success,
            multiplier
        );

        ConfidenceAdjustment {
            mode: self.config.boost_mode,
            base,
            adjusted,
            active: self.is_active(),
            multiplier,
            bonus,
            pattern_success,
            symbol_success,
            probability,
        }
    }

    /// Append a closed trade to the outcome histories
    ///
    /// Never trains inline; it only flags a retrain as due once the sample
    /// threshold is met and either no classifier is fitted yet or
    /// `retrain_interval` trades arrived since the last fit.
    pub fn record_outcome(&mut self, trade: &ClosedTrade) {
        let win = trade.is_win();
        let cap = self.config.max_outcomes_per_key;
        let pattern = PatternKey::from_snapshot(&trade.entry_snapshot, trade.entry_trend);

        push_bounded(
            self.instrument_outcomes
                .entry(trade.instrument.clone())
                .or_default(),
            win,
            cap,
        );
        push_bounded(self.pattern_outcomes.entry(pattern).or_default(), win, cap);
        push_bounded(
            &mut self.training,
            TrainingSample {
                features: FeatureVector::from_trade(trade),
                win,
            },
            self.config.max_training_samples,
        );
        self.total_recorded += 1;

        if self.is_active() {
            let since = self.total_recorded - self.trained_at;
            if !self.classifier.is_trained() || since >= self.config.retrain_interval.max(1) {
                self.retrain_due = true;
            }
        }
    }

    /// Take a copy of the training set if a retrain is due, clearing the flag
    pub fn take_training_job(&mut self) -> Option<TrainingJob<C>> {
        if !self.retrain_due {
            return None;
        }
        self.retrain_due = false;
        Some(TrainingJob {
            classifier: self.classifier.fresh(),
            samples: self.training.iter().copied().collect(),
            recorded_at: self.total_recorded,
        })
    }

    /// Swap in a classifier fitted by a background job
    pub fn install(&mut self, trained: TrainedClassifier<C>) {
        tracing::info!(
            "🧠 {} retrained on {} trades (training accuracy {:.1}%)",
            trained.classifier.name(),
            trained.report.samples,
            trained.report.accuracy * 100.0
        );
        self.classifier = trained.classifier;
        self.trained_at = trained.recorded_at;
    }

    /// Retrain in place if due. Returns whether a retrain happened.
    pub fn retrain_if_due(&mut self) -> Result<bool, TradingError> {
        match self.take_training_job() {
            Some(job) => {
                let trained = job.run()?;
                self.install(trained);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replay a trade history (e.g. the ledger on start-up) and fit once
    pub fn rebuild_from<'a>(
        &mut self,
        trades: impl IntoIterator<Item = &'a ClosedTrade>,
    ) -> Result<(), TradingError> {
        for trade in trades {
            self.record_outcome(trade);
        }
        self.retrain_if_due()?;
        Ok(())
    }
}

fn win_rate(outcomes: &VecDeque<bool>) -> f64 {
    outcomes.iter().filter(|w| **w).count() as f64 / outcomes.len() as f64
}

fn push_bounded<T>(queue: &mut VecDeque<T>, value: T, cap: usize) {
    queue.push_back(value);
    while queue.len() > cap.max(1) {
        queue.pop_front();
    }
}
