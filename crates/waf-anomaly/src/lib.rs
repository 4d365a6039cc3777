//! Anomaly Scorer and Adaptive Learner (spec §4.5, §4.6): statistical
//! deviation-from-baseline scoring, and the phased learner that tunes
//! it over time.

mod baseline;
mod learner;
mod scorer;

pub use baseline::Baseline;
pub use learner::{AdaptiveLearner, AdaptiveReport, LearningPhase, PercentileThresholds, RuleSuggestion};
pub use scorer::{score, AnomalyFactor, AnomalyResult};
