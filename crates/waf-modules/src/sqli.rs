//! SQL-injection signature module (spec §4.2).

use once_cell::sync::Lazy;
use regex::Regex;
use waf_common::model::{AnalysisRecord, ModuleFinding};

use crate::pattern_set::{scan, ComboRule, PatternRule};
use crate::DetectionModule;

fn rule(id: &'static str, pattern: &str, score: f64, description: &'static str) -> PatternRule {
    PatternRule {
        id,
        regex: Regex::new(pattern).unwrap_or_else(|e| panic!("bad sqli pattern {id}: {e}")),
        score,
        threat_type: "sqli",
        description,
    }
}

static RULES: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    vec![
        rule(
            "union-select",
            r"(?i)\bunion(\s+all)?\s+select\b",
            4.0,
            "UNION SELECT injection",
        ),
        rule(
            "boolean-tautology",
            r"(?i)\b(or|and)\s+(1\s*=\s*1|1\s*=\s*0|true|false)\b",
            3.0,
            "Boolean tautology injection",
        ),
        rule(
            "time-based",
            r"(?i)\b(sleep|benchmark)\s*\(|waitfor\s+delay\b",
            5.0,
            "Time-based blind injection",
        ),
        rule(
            "error-based",
            r"(?i)\b(extractvalue|updatexml|exp)\s*\(",
            4.0,
            "Error-based injection",
        ),
        rule(
            "stacked-query",
            r"(?i);\s*(select|insert|update|delete|drop|create|alter)\b",
            5.0,
            "Stacked query injection",
        ),
        rule("semicolon", r";", 0.0, "Statement separator present"),
        rule("comment-dash", r"--(?:\s|$)", 2.0, "SQL dash-comment"),
        rule("comment-hash", r"#(?:\s|$)", 2.0, "SQL hash-comment"),
        rule("comment-block", r"(?s)/\*.*?\*/", 2.0, "SQL block comment"),
        rule(
            "information-schema",
            r"(?i)information_schema|mysql\.(tables|user)",
            3.0,
            "Information schema enumeration",
        ),
        rule(
            "file-io",
            r"(?i)load_file\s*\(|into\s+(outfile|dumpfile)",
            5.0,
            "SQL file I/O primitive",
        ),
        rule("drop-table", r"(?i)drop\s+table\b", 5.0, "DROP TABLE injection"),
        rule(
            "ddl-general",
            r"(?i)\b(truncate|alter|create)\s+(table|database)\b",
            4.0,
            "DDL statement injection",
        ),
        rule(
            "dml-general",
            r"(?i)\binsert\s+into\b|\bupdate\s+\w+\s+set\b|\bdelete\s+from\b",
            3.0,
            "DML statement injection",
        ),
        rule(
            "privilege",
            r"(?i)\b(grant|revoke)\b.*\bon\b",
            4.0,
            "Privilege grant/revoke injection",
        ),
        rule(
            "sql-functions",
            r"(?i)\b(concat|char|ascii|substring|cast|convert)\s*\(",
            1.0,
            "SQL string/cast function usage",
        ),
        rule(
            "sql-clauses",
            r"(?i)\border\s+by\b|\bgroup\s+by\b|\bhaving\b|\blimit\s+\d+\s+offset\b|like\s*'%|\bbetween\b",
            1.0,
            "SQL clause usage",
        ),
        rule(
            "subquery",
            r"(?i)\(\s*select\b|\bexists\s*\(",
            3.0,
            "Subquery injection",
        ),
        rule(
            "admin-bypass",
            r#"(?i)admin'--|admin"--"#,
            5.0,
            "admin authentication bypass",
        ),
    ]
});

static COMBOS: Lazy<Vec<ComboRule>> = Lazy::new(|| {
    vec![
        ComboRule {
            id: "union-information-schema",
            threat_type: "sqli",
            description: "UNION SELECT combined with information_schema enumeration",
            score: 4.0,
            predicate: |ids| ids.contains("union-select") && ids.contains("information-schema"),
        },
        ComboRule {
            id: "time-based-chain",
            threat_type: "sqli",
            description: "Time-based primitive combined with a union/boolean injection",
            score: 4.0,
            predicate: |ids| {
                ids.contains("time-based")
                    && (ids.contains("union-select") || ids.contains("boolean-tautology"))
            },
        },
        ComboRule {
            id: "stacked-chain",
            threat_type: "sqli",
            description: "Statement separator combined with a destructive statement",
            score: 3.0,
            predicate: |ids| {
                ids.contains("semicolon")
                    && (ids.contains("union-select")
                        || ids.contains("drop-table")
                        || ids.contains("ddl-general")
                        || ids.contains("dml-general"))
            },
        },
        ComboRule {
            id: "comment-evasion",
            threat_type: "sqli",
            description: "SQL comment combined with a select/union injection",
            score: 3.0,
            predicate: |ids| {
                (ids.contains("comment-dash")
                    || ids.contains("comment-hash")
                    || ids.contains("comment-block"))
                    && (ids.contains("union-select") || ids.contains("subquery"))
            },
        },
    ]
});

pub struct SqliModule;

impl DetectionModule for SqliModule {
    fn name(&self) -> &'static str {
        "sqli"
    }

    fn analyze(&self, record: &AnalysisRecord) -> Option<ModuleFinding> {
        let surface = record.search_surface();
        let (score, threats) = scan(&surface, &RULES, &COMBOS);
        if threats.is_empty() {
            None
        } else {
            Some(ModuleFinding {
                module: "sqli".to_string(),
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
    use waf_common::model::{Body, QueryValue};

    use super::*;

    fn base_record() -> AnalysisRecord {
        AnalysisRecord {
            request_id: "r1".into(),
            timestamp: Utc::now(),
            ip: "1.2.3.4".into(),
            user_agent: Some("curl/8.0".into()),
            method: "GET".into(),
            path: "/".into(),
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
    fn union_select_alone_scores_four() {
        let mut record = base_record();
        record
            .query
            .insert("q".into(), QueryValue::Single("1 UNION SELECT * FROM users".into()));
        let finding = SqliModule.analyze(&record).expect("should flag sqli");
        assert_eq!(finding.score, 4.0);
    }

    #[test]
    fn drop_table_in_body_scores_five() {
        let mut record = base_record();
        record.body = Body::Structured(serde_json::json!({"query": "DROP TABLE users"}));
        let finding = SqliModule.analyze(&record).expect("should flag sqli");
        assert_eq!(finding.score, 5.0);
    }

    #[test]
    fn trailing_comment_scores_two() {
        let mut record = base_record();
        record.query.insert("id".into(), QueryValue::Single("1--".into()));
        let finding = SqliModule.analyze(&record).expect("should flag sqli");
        assert_eq!(finding.score, 2.0);
    }

    #[test]
    fn clean_query_does_not_flag() {
        let mut record = base_record();
        record
            .query
            .insert("q".into(), QueryValue::Single("standard product search".into()));
        assert!(SqliModule.analyze(&record).is_none());
    }
}
