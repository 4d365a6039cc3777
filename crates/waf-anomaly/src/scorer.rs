//! The Anomaly Scorer (spec §4.5): a bounded-factor deviation score
//! computed against the rolling `Baseline`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use waf_common::model::{AnalysisRecord, QueryValue};

use crate::baseline::Baseline;

const SUSPICIOUS_QUERY_KEYS: &[&str] = &[
    "cmd", "exec", "eval", "system", "shell", "file", "path", "dir", "root", "admin", "password",
    "passwd", "pwd", "secret", "token", "key", "auth", "login",
];

static SUSPICIOUS_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\.\./|/admin|/wp-admin|\.env|\.git|[a-f0-9]{32,}|[A-Za-z0-9+/]{40,}={0,2}|(/[^/]+){6,})")
        .expect("valid suspicious-path regex")
});

static CRAWLER_UA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(bot|crawl|spider|scrape|wget|curl|python-requests)").unwrap());

static ALLOWED_BOT_UA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(googlebot|bingbot|duckduckbot)").unwrap());

static ENCODED_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(%[0-9A-Fa-f]{2}|&#x?[0-9A-Fa-f]+;|[A-Za-z0-9+/]{24,}={0,2})").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyFactor {
    pub name: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub total_score: f64,
    pub factors: Vec<AnomalyFactor>,
    pub is_anomaly: bool,
    pub confidence: f64,
}

fn push(factors: &mut Vec<AnomalyFactor>, name: &str, score: f64) {
    if score > 0.0 {
        factors.push(AnomalyFactor {
            name: name.to_string(),
            score,
        });
    }
}

/// Computes the anomaly score for one request against `baseline`.
/// `anomaly_threshold` drives both the §4.5 short-circuit (>100 zeroes
/// the score, a testing back door) and the `is_anomaly` verdict.
pub fn score(record: &AnalysisRecord, baseline: &Baseline, anomaly_threshold: f64) -> AnomalyResult {
    if anomaly_threshold > 100.0 {
        return AnomalyResult {
            total_score: 0.0,
            factors: Vec::new(),
            is_anomaly: false,
            confidence: 0.0,
        };
    }

    let mut factors = Vec::new();

    push(&mut factors, "frequency", frequency_factor(record, baseline));
    push(&mut factors, "user-agent", user_agent_factor(record, baseline));
    push(&mut factors, "path", path_factor(record, baseline));
    push(&mut factors, "query", query_factor(record));
    push(&mut factors, "body-size", body_size_factor(record, baseline));
    push(&mut factors, "headers", headers_factor(record));
    push(&mut factors, "time", time_factor(record));

    let total_score = round2(factors.iter().map(|f| f.score).sum());
    let mean_factor = if factors.is_empty() {
        0.0
    } else {
        factors.iter().map(|f| f.score).sum::<f64>() / factors.len() as f64
    };
    let confidence = (mean_factor * 0.1).clamp(0.0, 1.0);

    AnomalyResult {
        total_score,
        is_anomaly: total_score > anomaly_threshold,
        confidence,
        factors,
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn frequency_factor(record: &AnalysisRecord, baseline: &Baseline) -> f64 {
    let current = baseline.bump_ip_frequency(&record.ip) as f64;
    let mean = baseline.mean_requests_per_ip_window().max(1.0);
    let threshold = mean * 2.0;
    if current > threshold {
        ((current - threshold) * 0.5).min(10.0)
    } else {
        0.0
    }
}

fn user_agent_factor(record: &AnalysisRecord, baseline: &Baseline) -> f64 {
    let mut score = 0.0;
    match &record.user_agent {
        None => score += 3.0,
        Some(ua) if ua.len() < 10 => score += 3.0,
        Some(ua) => {
            if CRAWLER_UA.is_match(ua) && !ALLOWED_BOT_UA.is_match(ua) {
                score += 2.0;
            }
            if ua.len() > 500 {
                score += 4.0;
            }
            if baseline.user_agent_frequency_ratio(ua) < 0.01 {
                score += 1.0;
            }
        }
    }
    score
}

fn path_factor(record: &AnalysisRecord, baseline: &Baseline) -> f64 {
    let mut score = 0.0;
    if SUSPICIOUS_PATH.is_match(&record.path) {
        score += 2.0;
    }
    if record.path.len() > 200 {
        score += 1.0;
    }
    if baseline.path_frequency_ratio(&record.path) < 0.005 {
        score += 1.0;
    }
    score
}

fn query_factor(record: &AnalysisRecord) -> f64 {
    let mut key_score = 0.0;
    let mut other_score = 0.0;
    for (key, value) in &record.query {
        if SUSPICIOUS_QUERY_KEYS.contains(&key.to_lowercase().as_str()) {
            key_score += 2.0;
        }
        for v in value.values() {
            if v.len() > 1000 {
                other_score += 1.0;
            }
            if ENCODED_VALUE.is_match(v) {
                other_score += 1.0;
            }
        }
    }
    key_score.min(5.0) + other_score
}

fn body_size_factor(record: &AnalysisRecord, baseline: &Baseline) -> f64 {
    let body_len = record.body.as_scan_text().len() as f64;
    let mean = baseline.mean_body_size();
    if mean > 0.0 && body_len > mean * 3.0 {
        ((body_len - mean) / 1000.0).min(5.0)
    } else {
        0.0
    }
}

fn headers_factor(record: &AnalysisRecord) -> f64 {
    let mut score = 0.0;
    let required = ["user-agent", "accept", "accept-language"];
    let missing = required
        .iter()
        .filter(|h| !record.headers.contains_key(**h))
        .count();
    if missing > 1 {
        score += 2.0;
    }
    let mut long_value = false;
    let mut long_encoded = false;
    for v in record.headers.values() {
        let text = v.as_scan_text();
        if text.len() > 500 {
            long_value = true;
        }
        if ENCODED_VALUE.is_match(&text) && text.len() > 100 {
            long_encoded = true;
        }
    }
    if long_value {
        score += 1.0;
    }
    if long_encoded {
        score += 1.0;
    }
    score.min(3.0)
}

fn time_factor(record: &AnalysisRecord) -> f64 {
    use chrono::{Datelike, Timelike, Weekday};
    let mut score = 0.0;
    let hour = record.timestamp.hour();
    if (2..6).contains(&hour) {
        score += 1.0;
    }
    if matches!(record.timestamp.weekday(), Weekday::Sat | Weekday::Sun) {
        score += 0.5;
    }
    score
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use waf_common::model::Body;

    use super::*;

    fn blank_record() -> AnalysisRecord {
        AnalysisRecord {
            request_id: "r1".into(),
            timestamp: Utc::now(),
            ip: "1.2.3.4".into(),
            user_agent: Some("Mozilla/5.0 (compatible)".into()),
            method: "GET".into(),
            path: "/home".into(),
            query: HashMap::new(),
            body: Body::Empty,
            headers: HashMap::new(),
            cookies: HashMap::new(),
            score: 0.0,
            threats: Vec::new(),
            modules_touched: Vec::new(),
        }
    }

    #[test]
    fn threshold_above_100_short_circuits_to_zero() {
        let baseline = Baseline::new();
        let record = blank_record();
        let result = score(&record, &baseline, 101.0);
        assert_eq!(result.total_score, 0.0);
        assert!(result.factors.is_empty());
    }

    #[test]
    fn missing_user_agent_scores_three() {
        let baseline = Baseline::new();
        let mut record = blank_record();
        record.user_agent = None;
        let result = score(&record, &baseline, 5.0);
        assert!(result.factors.iter().any(|f| f.name == "user-agent" && f.score == 3.0));
    }

    #[test]
    fn suspicious_query_keys_cap_at_five() {
        let baseline = Baseline::new();
        let mut record = blank_record();
        for key in ["cmd", "exec", "eval", "system"] {
            record
                .query
                .insert(key.to_string(), QueryValue::Single("x".into()));
        }
        let result = score(&record, &baseline, 5.0);
        let query_factor = result.factors.iter().find(|f| f.name == "query").unwrap();
        assert_eq!(query_factor.score, 5.0);
    }

    #[test]
    fn is_anomaly_respects_configured_threshold() {
        let baseline = Baseline::new();
        let mut record = blank_record();
        record.path = "/admin/../../.env".into();
        let result = score(&record, &baseline, 0.0);
        assert!(result.is_anomaly);
    }
}
