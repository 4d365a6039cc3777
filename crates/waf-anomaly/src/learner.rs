//! The Adaptive Learner (spec §4.6): a phased state machine scheduled
//! by wall-clock deltas from a fixed start time.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

const MAX_BUFFERED_SCORES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningPhase {
    Collecting,
    Analyzing,
    Adapting,
    Protecting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PercentileThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSuggestion {
    pub threat_type: String,
    pub observed_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveReport {
    pub thresholds: PercentileThresholds,
    pub ip_frequency_threshold: f64,
    pub body_size_threshold: f64,
    pub rule_suggestions: Vec<RuleSuggestion>,
}

#[derive(Default)]
struct LearnerBuffer {
    positive_scores: Vec<f64>,
    threat_type_counts: HashMap<String, u64>,
    ip_request_counts: HashMap<String, u64>,
    body_sizes: Vec<u64>,
}

/// Phased learner scheduled purely by elapsed wall-clock time from
/// `start_time` — the phase is a monotonic function of `now`, so
/// transitions are one-way by construction and `Protecting` is
/// terminal once reached (spec §4.6).
pub struct AdaptiveLearner {
    enabled: bool,
    start_time: DateTime<Utc>,
    learning_period: ChronoDuration,
    buffer: RwLock<LearnerBuffer>,
}

impl AdaptiveLearner {
    pub fn new(enabled: bool, start_time: DateTime<Utc>, learning_period_days: u64) -> Self {
        Self {
            enabled,
            start_time,
            learning_period: ChronoDuration::days(learning_period_days.max(1) as i64),
            buffer: RwLock::new(LearnerBuffer::default()),
        }
    }

    /// A disabled learner starts directly in `Protecting` (spec §4.6).
    pub fn phase(&self, now: DateTime<Utc>) -> LearningPhase {
        if !self.enabled {
            return LearningPhase::Protecting;
        }
        let elapsed = now.signed_duration_since(self.start_time);
        let period_ms = self.learning_period.num_milliseconds().max(1) as f64;
        let fraction = elapsed.num_milliseconds() as f64 / period_ms;
        if fraction < 0.6 {
            LearningPhase::Collecting
        } else if fraction < 0.8 {
            LearningPhase::Analyzing
        } else if fraction < 1.0 {
            LearningPhase::Adapting
        } else {
            LearningPhase::Protecting
        }
    }

    /// Whether the rule-engine verdict should actually be enforced, vs.
    /// always-allow (spec §4.6 verdict policy column).
    pub fn should_enforce(&self, now: DateTime<Utc>) -> bool {
        self.phase(now) == LearningPhase::Protecting
    }

    /// Fraction of `learningPeriod` elapsed, clamped to `[0, 1]`, for the
    /// `waf_learning_progress{phase}` gauge (spec §6, §3
    /// `LearningState.progress`).
    pub fn progress(&self, now: DateTime<Utc>) -> f64 {
        let elapsed = now.signed_duration_since(self.start_time);
        let period_ms = self.learning_period.num_milliseconds().max(1) as f64;
        (elapsed.num_milliseconds() as f64 / period_ms).clamp(0.0, 1.0)
    }

    /// Buffers one request's outcome for later percentile/adaptation
    /// analysis. Skipped once `Protecting` is reached (the baseline is
    /// frozen at that point, per spec §4.5/§4.6). Ring-buffered at
    /// `MAX_BUFFERED_SCORES` entries to bound memory.
    pub fn observe(&self, now: DateTime<Utc>, ip: &str, body_len: usize, score: f64, threat_types: &[String]) {
        if self.phase(now) == LearningPhase::Protecting {
            return;
        }
        let mut buffer = self.buffer.write().unwrap();
        if score > 0.0 {
            if buffer.positive_scores.len() >= MAX_BUFFERED_SCORES {
                buffer.positive_scores.remove(0);
            }
            buffer.positive_scores.push(score);
        }
        if buffer.body_sizes.len() >= MAX_BUFFERED_SCORES {
            buffer.body_sizes.remove(0);
        }
        buffer.body_sizes.push(body_len as u64);
        *buffer.ip_request_counts.entry(ip.to_string()).or_insert(0) += 1;
        for t in threat_types {
            *buffer.threat_type_counts.entry(t.clone()).or_insert(0) += 1;
        }
    }

    /// Derives percentile thresholds and adaptation recommendations
    /// from everything buffered so far (spec §4.6). Callable in any
    /// phase; most useful once `Analyzing`/`Adapting` is reached.
    pub fn derive_report(&self) -> AdaptiveReport {
        let buffer = self.buffer.read().unwrap();

        let mut sorted = buffer.positive_scores.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let thresholds = PercentileThresholds {
            low: percentile(&sorted, 0.50).max(1.0),
            medium: percentile(&sorted, 0.75).max(3.0),
            high: percentile(&sorted, 0.90).max(5.0),
            critical: percentile(&sorted, 0.95).max(10.0),
        };

        let mean_ip_requests = if buffer.ip_request_counts.is_empty() {
            0.0
        } else {
            buffer.ip_request_counts.values().sum::<u64>() as f64
                / buffer.ip_request_counts.len() as f64
        };
        let mean_body_size = if buffer.body_sizes.is_empty() {
            0.0
        } else {
            buffer.body_sizes.iter().sum::<u64>() as f64 / buffer.body_sizes.len() as f64
        };

        let mut rule_suggestions: Vec<RuleSuggestion> = buffer
            .threat_type_counts
            .iter()
            .filter(|(_, count)| **count > 5)
            .map(|(threat_type, count)| RuleSuggestion {
                threat_type: threat_type.clone(),
                observed_count: *count,
            })
            .collect();
        rule_suggestions.sort_by(|a, b| b.observed_count.cmp(&a.observed_count));

        AdaptiveReport {
            thresholds,
            ip_frequency_threshold: mean_ip_requests * 3.0,
            body_size_threshold: mean_body_size * 2.0,
            rule_suggestions,
        }
    }
}

/// Linear-interpolation percentile over an already-sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let weight = rank - lower as f64;
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    }
}
