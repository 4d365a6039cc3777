//! The core data model: `AnalysisRecord`, `Threat`, and `Rule`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Value of a query parameter, which may repeat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum QueryValue {
    Single(String),
    Multi(Vec<String>),
}

impl QueryValue {
    /// All string values this parameter carries, for scanning.
    pub fn values(&self) -> Vec<&str> {
        match self {
            QueryValue::Single(s) => vec![s.as_str()],
            QueryValue::Multi(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

/// Request body, which may arrive as raw text or already-structured JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Body {
    Text(String),
    Structured(serde_json::Value),
    Empty,
}

impl Body {
    /// Serialize the body to a single string for pattern scanning.
    /// Structured bodies are re-serialized; this never mutates the
    /// caller's original value.
    pub fn as_scan_text(&self) -> String {
        match self {
            Body::Text(s) => s.clone(),
            Body::Structured(v) => v.to_string(),
            Body::Empty => String::new(),
        }
    }
}

/// A single header or cookie value as seen by the extractor. Non-string
/// values are coerced by serialization before scanning (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Other(serde_json::Value),
}

impl FieldValue {
    pub fn as_scan_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Other(v) => v.to_string(),
        }
    }
}

/// The normalized per-request record every detection module and the
/// rule engine operate on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub ip: String,
    pub user_agent: Option<String>,
    pub method: String,
    pub path: String,
    pub query: HashMap<String, QueryValue>,
    pub body: Body,
    pub headers: HashMap<String, FieldValue>,
    pub cookies: HashMap<String, FieldValue>,

    /// Running cumulative score; monotonically non-decreasing within a
    /// single analysis (invariant, §3).
    pub score: f64,
    pub threats: Vec<Threat>,
    pub modules_touched: Vec<String>,
}

impl AnalysisRecord {
    /// The union-of-fields search surface used by every detection
    /// module: path, each query string value, the serialized body,
    /// each string header value, each string cookie value (§4.2).
    pub fn search_surface(&self) -> Vec<(&'static str, String)> {
        let mut surface = Vec::new();
        surface.push(("path", self.path.clone()));
        for values in self.query.values() {
            for v in values.values() {
                surface.push(("query", v.to_string()));
            }
        }
        let body_text = self.body.as_scan_text();
        if !body_text.is_empty() {
            surface.push(("body", body_text));
        }
        for v in self.headers.values() {
            surface.push(("header", v.as_scan_text()));
        }
        for v in self.cookies.values() {
            surface.push(("cookie", v.as_scan_text()));
        }
        surface
    }

    /// Add a threat and bump the running score by its contribution.
    /// Never decreases `score` — callers rely on this for the
    /// monotonicity invariant.
    pub fn record_threat(&mut self, module: &str, threat: Threat) {
        self.score += threat.score;
        self.threats.push(threat);
        if !self.modules_touched.iter().any(|m| m == module) {
            self.modules_touched.push(module.to_string());
        }
    }
}

/// A detected threat, embedded in the `AnalysisRecord` and in event
/// payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Threat {
    pub threat_type: String,
    pub pattern_id: String,
    pub description: String,
    pub score: f64,
    /// Matched excerpt, truncated to 100 chars (§3).
    pub matched_excerpt: String,
}

impl Threat {
    pub fn new(
        threat_type: impl Into<String>,
        pattern_id: impl Into<String>,
        description: impl Into<String>,
        score: f64,
        matched_text: &str,
    ) -> Self {
        let mut excerpt: String = matched_text.chars().take(100).collect();
        if matched_text.chars().count() > 100 {
            excerpt.push('\u{2026}');
        }
        Self {
            threat_type: threat_type.into(),
            pattern_id: pattern_id.into(),
            description: description.into(),
            score,
            matched_excerpt: excerpt,
        }
    }
}

/// The result a detection module returns for one request.
#[derive(Debug, Clone)]
pub struct ModuleFinding {
    pub module: String,
    pub score: f64,
    pub threats: Vec<Threat>,
}

/// Where a `Rule` came from — informational, drives `delete` semantics
/// (only `Custom` rules may be deleted, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSource {
    Builtin,
    Custom,
    Community,
    Imported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A compiled, flat (pattern -> score) rule owned by the Rule Manager.
///
/// The compiled pattern is immutable after add; `RuleManager::update`
/// replaces this value wholesale rather than mutating fields in place
/// (invariant, §3).
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub category: String,
    pub pattern_source: String,
    pub pattern: Regex,
    /// The original extended-regex flag string (spec §6, e.g. `"gi"`),
    /// kept alongside the compiled pattern so a partial `update` that
    /// omits `flags` recompiles with the rule's own flags rather than
    /// a hardcoded default.
    pub flags: String,
    pub score: f64,
    pub severity: Severity,
    pub tags: Vec<String>,
    pub enabled: bool,
    pub source: RuleSource,
    pub description: Option<String>,
}

impl Rule {
    /// `score >= 0` is required for every enabled rule (invariant, §4.3).
    pub fn is_valid(&self) -> bool {
        self.score >= 0.0
    }
}
