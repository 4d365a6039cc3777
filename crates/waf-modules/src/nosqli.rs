//! NoSQL-injection signature module (spec §4.2 supplement — MongoDB-style
//! operator injection).

use once_cell::sync::Lazy;
use regex::Regex;
use waf_common::model::{AnalysisRecord, ModuleFinding};

use crate::pattern_set::{scan, ComboRule, PatternRule};
use crate::DetectionModule;

fn rule(id: &'static str, pattern: &str, score: f64, description: &'static str) -> PatternRule {
    PatternRule {
        id,
        regex: Regex::new(pattern).unwrap_or_else(|e| panic!("bad nosqli pattern {id}: {e}")),
        score,
        threat_type: "nosqli",
        description,
    }
}

static RULES: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    vec![
        rule("operator-where", r"\$where\b", 5.0, "$where operator injection"),
        rule("operator-ne", r"\$ne\b", 3.0, "$ne operator injection"),
        rule(
            "operator-comparison",
            r"\$(gt|gte|lt|lte)\b",
            2.0,
            "numeric comparison operator injection",
        ),
        rule("operator-regex", r"\$regex\b", 3.0, "$regex operator injection"),
        rule("operator-exists", r"\$exists\b", 2.0, "$exists operator injection"),
        rule(
            "operator-in",
            r"\$(in|nin)\b",
            2.0,
            "$in/$nin operator injection",
        ),
        rule(
            "js-context",
            r"\bfunction\s*\(|\bthis\.\w+",
            4.0,
            "JavaScript execution context in query",
        ),
    ]
});

static COMBOS: Lazy<Vec<ComboRule>> = Lazy::new(|| {
    vec![ComboRule {
        id: "where-js-context",
        threat_type: "nosqli",
        description: "$where operator combined with a JavaScript execution context",
        score: 3.0,
        predicate: |ids| ids.contains("operator-where") && ids.contains("js-context"),
    }]
});

pub struct NoSqliModule;

impl DetectionModule for NoSqliModule {
    fn name(&self) -> &'static str {
        "nosqli"
    }

    fn analyze(&self, record: &AnalysisRecord) -> Option<ModuleFinding> {
        let surface = record.search_surface();
        let (score, threats) = scan(&surface, &RULES, &COMBOS);
        if threats.is_empty() {
            None
        } else {
            Some(ModuleFinding {
                module: "nosqli".to_string(),
                score,
                threats,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use waf_common::model::Body;

    use super::*;

    #[test]
    fn where_clause_injection_is_flagged() {
        let record = AnalysisRecord {
            request_id: "r1".into(),
            timestamp: Utc::now(),
            ip: "1.2.3.4".into(),
            user_agent: None,
            method: "POST".into(),
            path: "/login".into(),
            query: HashMap::new(),
            body: Body::Structured(serde_json::json!({"$where": "this.password.length > 0"})),
            headers: HashMap::new(),
            cookies: HashMap::new(),
            score: 0.0,
            threats: Vec::new(),
            modules_touched: Vec::new(),
        };
        let finding = NoSqliModule.analyze(&record).expect("should flag nosqli");
        assert!(finding.score >= 5.0);
    }
}
