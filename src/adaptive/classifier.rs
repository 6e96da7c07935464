use super::features::{FeatureVector, FEATURE_COUNT};
use crate::error::TradingError;
use serde::{Deserialize, Serialize};

/// One labelled historical trade
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub features: FeatureVector,
    pub win: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub samples: usize,
    pub accuracy: f64, // on the training set
}

/// Binary classifier predicting whether a trade will be profitable
pub trait ConfidenceClassifier: Send + Sync {
    /// Fit from scratch on the given samples
    fn fit(&mut self, samples: &[TrainingSample]) -> Result<TrainingReport, TradingError>;

    /// Probability of a profitable outcome, `None` until fitted
    fn predict_proba(&self, features: &FeatureVector) -> Option<f64>;

    fn is_trained(&self) -> bool;

    fn name(&self) -> &str;
}

/// Logistic regression on standardised features
///
/// Trained by full-batch gradient descent with L2 regularisation. Training
/// is deterministic: same samples, same parameters.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    learning_rate: f64,
    epochs: usize,
    l2: f64,
    weights: [f64; FEATURE_COUNT],
    bias: f64,
    means: [f64; FEATURE_COUNT],
    scales: [f64; FEATURE_COUNT],
    trained: bool,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new(0.1, 500, 0.001)
    }
}

impl LogisticRegression {
    pub fn new(learning_rate: f64, epochs: usize, l2: f64) -> Self {
        Self {
            learning_rate,
            epochs,
            l2,
            weights: [0.0; FEATURE_COUNT],
            bias: 0.0,
            means: [0.0; FEATURE_COUNT],
            scales: [1.0; FEATURE_COUNT],
            trained: false,
        }
    }

    /// Same hyper-parameters, no fitted state
    pub fn untrained(&self) -> Self {
        Self::new(self.learning_rate, self.epochs, self.l2)
    }

    pub fn weights(&self) -> &[f64; FEATURE_COUNT] {
        &self.weights
    }

    fn standardize(&self, features: &FeatureVector) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for (i, value) in features.values().iter().enumerate() {
            out[i] = (value - self.means[i]) / self.scales[i];
        }
        out
    }

    fn logit(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        self.bias + x.iter().zip(&self.weights).map(|(x, w)| x * w).sum::<f64>()
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl ConfidenceClassifier for LogisticRegression {
    fn fit(&mut self, samples: &[TrainingSample]) -> Result<TrainingReport, TradingError> {
        if samples.is_empty() {
            return Err(TradingError::Computation(
                "cannot fit classifier on zero samples".to_string(),
            ));
        }
        let n = samples.len() as f64;

        // Feature scaling
        let mut means = [0.0; FEATURE_COUNT];
        for sample in samples {
            for (i, v) in sample.features.values().iter().enumerate() {
                means[i] += v / n;
            }
        }
        let mut scales = [0.0; FEATURE_COUNT];
        for sample in samples {
            for (i, v) in sample.features.values().iter().enumerate() {
                scales[i] += (v - means[i]).powi(2) / n;
            }
        }
        for scale in scales.iter_mut() {
            *scale = if *scale > 1e-12 { scale.sqrt() } else { 1.0 };
        }

        self.means = means;
        self.scales = scales;
        self.weights = [0.0; FEATURE_COUNT];
        self.bias = 0.0;

        let rows: Vec<([f64; FEATURE_COUNT], f64)> = samples
            .iter()
            .map(|s| (self.standardize(&s.features), if s.win { 1.0 } else { 0.0 }))
            .collect();

        for _ in 0..self.epochs {
            let mut grad_w = [0.0; FEATURE_COUNT];
            let mut grad_b = 0.0;
            for (x, y) in &rows {
                let err = sigmoid(self.logit(x)) - y;
                for (g, xi) in grad_w.iter_mut().zip(x) {
                    *g += err * xi;
                }
                grad_b += err;
            }
            for (w, g) in self.weights.iter_mut().zip(&grad_w) {
                *w -= self.learning_rate * (g / n + self.l2 * *w);
            }
            self.bias -= self.learning_rate * grad_b / n;
        }

        if self.weights.iter().any(|w| !w.is_finite()) || !self.bias.is_finite() {
            self.trained = false;
            return Err(TradingError::Computation(
                "classifier weights diverged".to_string(),
            ));
        }
        self.trained = true;

        let correct = rows
            .iter()
            .filter(|(x, y)| (sigmoid(self.logit(x)) >= 0.5) == (*y == 1.0))
            .count();

        Ok(TrainingReport {
            samples: samples.len(),
            accuracy: correct as f64 / n,
        })
    }

    fn predict_proba(&self, features: &FeatureVector) -> Option<f64> {
        if !self.trained {
            return None;
        }
        let p = sigmoid(self.logit(&self.standardize(features)));
        p.is_finite().then_some(p)
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn name(&self) -> &str {
        "logistic_regression"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(rsi: f64, adx: f64, win: bool) -> TrainingSample {
        TrainingSample {
            features: FeatureVector([rsi, 0.0, 0.0, 0.5, 1.0, 0.1, 0.01, adx]),
            win,
        }
    }

    #[test]
    fn test_untrained_predicts_nothing() {
        let clf = LogisticRegression::default();
        assert!(!clf.is_trained());
        assert!(clf.predict_proba(&sample(30.0, 20.0, true).features).is_none());
    }

    #[test]
    fn test_fit_on_empty_is_error() {
        let mut clf = LogisticRegression::default();
        assert!(clf.fit(&[]).is_err());
    }

    #[test]
    fn test_learns_separable_rule() {
        // Wins when RSI is low, losses when it is high
        let samples: Vec<_> = (0..60)
            .map(|i| {
                let rsi = 20.0 + i as f64;
                sample(rsi, 25.0, rsi < 50.0)
            })
            .collect();

        let mut clf = LogisticRegression::default();
        let report = clf.fit(&samples).unwrap();
        assert_eq!(report.samples, 60);
        assert!(report.accuracy > 0.9);

        let low = clf.predict_proba(&sample(22.0, 25.0, true).features).unwrap();
        let high = clf.predict_proba(&sample(78.0, 25.0, false).features).unwrap();
        assert!(low > 0.5, "low RSI should predict a win, got {:.3}", low);
        assert!(high < 0.5, "high RSI should predict a loss, got {:.3}", high);
    }

    #[test]
    fn test_training_is_deterministic() {
        let samples: Vec<_> = (0..50)
            .map(|i| sample(i as f64, (i % 7) as f64 * 5.0, i % 3 == 0))
            .collect();
        let mut a = LogisticRegression::default();
        let mut b = LogisticRegression::default();
        a.fit(&samples).unwrap();
        b.fit(&samples).unwrap();
        assert_eq!(a.weights(), b.weights());
    }

    #[test]
    fn test_constant_feature_does_not_blow_up() {
        let samples: Vec<_> = (0..50).map(|i| sample(40.0, 20.0, i % 2 == 0)).collect();
        let mut clf = LogisticRegression::default();
        clf.fit(&samples).unwrap();
        let p = clf.predict_proba(&samples[0].features).unwrap();
        assert!((p - 0.5).abs() < 0.05);
    }
}
