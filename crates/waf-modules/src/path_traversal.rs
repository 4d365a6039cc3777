//! Path-traversal signature module (spec §4.2 supplement).

use once_cell::sync::Lazy;
use regex::Regex;
use waf_common::model::{AnalysisRecord, ModuleFinding};

use crate::pattern_set::{scan, ComboRule, PatternRule};
use crate::DetectionModule;

fn rule(id: &'static str, pattern: &str, score: f64, description: &'static str) -> PatternRule {
    PatternRule {
        id,
        regex: Regex::new(pattern).unwrap_or_else(|e| panic!("bad path-traversal pattern {id}: {e}")),
        score,
        threat_type: "path-traversal",
        description,
    }
}

static RULES: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    vec![
        rule("dot-dot-slash", r"\.\./|\.\.\\", 3.0, "Relative directory traversal"),
        rule(
            "encoded-traversal",
            r"(?i)%2e%2e(%2f|/|%5c|\\)",
            3.0,
            "URL-encoded directory traversal",
        ),
        rule(
            "sensitive-path",
            r"(?i)/etc/passwd|/etc/shadow|/proc/self|win\.ini|boot\.ini",
            4.0,
            "Sensitive absolute path reference",
        ),
        rule("null-byte", r"%00", 3.0, "Null-byte injection"),
    ]
});

static COMBOS: Lazy<Vec<ComboRule>> = Lazy::new(|| {
    vec![ComboRule {
        id: "traversal-sensitive-target",
        threat_type: "path-traversal",
        description: "Directory traversal aimed at a sensitive file",
        score: 3.0,
        predicate: |ids| {
            (ids.contains("dot-dot-slash") || ids.contains("encoded-traversal"))
                && ids.contains("sensitive-path")
        },
    }]
});

pub struct PathTraversalModule;

impl DetectionModule for PathTraversalModule {
    fn name(&self) -> &'static str {
        "path-traversal"
    }

    fn analyze(&self, record: &AnalysisRecord) -> Option<ModuleFinding> {
        let surface = record.search_surface();
        let (score, threats) = scan(&surface, &RULES, &COMBOS);
        if threats.is_empty() {
            None
        } else {
            Some(ModuleFinding {
                module: "path-traversal".to_string(),
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
    fn dot_dot_slash_to_etc_passwd_scores_combo() {
        let record = AnalysisRecord {
            request_id: "r1".into(),
            timestamp: Utc::now(),
            ip: "1.2.3.4".into(),
            user_agent: None,
            method: "GET".into(),
            path: "/files/../../etc/passwd".into(),
            query: HashMap::new(),
            body: Body::Empty,
            headers: HashMap::new(),
            cookies: HashMap::new(),
            score: 0.0,
            threats: Vec::new(),
            modules_touched: Vec::new(),
        };
        let finding = PathTraversalModule.analyze(&record).expect("should flag traversal");
        assert_eq!(finding.score, 3.0 + 4.0 + 3.0);
    }
}
