// Adaptive confidence: outcome history, pattern buckets and a trainable
// classifier that adjust signal confidence

pub mod classifier;
pub mod features;
pub mod model;
pub mod pattern;

pub use classifier::{ConfidenceClassifier, LogisticRegression, TrainingReport, TrainingSample};
pub use features::FeatureVector;
pub use model::{
    AdaptiveConfidenceModel, AdaptiveConfig, BoostMode, ConfidenceAdjustment, Retrainable,
    TrainedClassifier, TrainingJob,
};
pub use pattern::PatternKey;
