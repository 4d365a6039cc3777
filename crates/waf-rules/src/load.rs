//! Rule file format parsing (spec §6) and pattern compilation.

use regex::Regex;
use serde::Deserialize;
use waf_common::model::{Rule, RuleSource, Severity};

fn default_flags() -> String {
    "gi".to_string()
}

fn default_enabled() -> bool {
    true
}

/// One entry in the JSON array rule file format (spec §6).
#[derive(Debug, Clone, Deserialize)]
pub struct RawRule {
    pub id: String,
    pub name: String,
    pub category: String,
    pub pattern: String,
    pub score: f64,
    #[serde(default = "default_flags")]
    pub flags: String,
    pub description: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Translates an extended-regex flag string (e.g. `"gi"`) into the
/// inline flag group Rust's `regex` crate understands. `g` (global) has
/// no Rust-side equivalent — `Regex::find`/`find_iter` are always
/// "global" — so it's accepted and ignored.
fn inline_flags(flags: &str) -> String {
    let mut inline = String::new();
    for c in flags.chars() {
        match c {
            'i' | 'm' | 's' | 'x' => inline.push(c),
            'g' => {}
            _ => {}
        }
    }
    if inline.is_empty() {
        String::new()
    } else {
        format!("(?{inline})")
    }
}

fn parse_severity(s: Option<&str>) -> Severity {
    match s.map(str::to_lowercase).as_deref() {
        Some("critical") => Severity::Critical,
        Some("high") => Severity::High,
        Some("low") => Severity::Low,
        _ => Severity::Medium,
    }
}

/// Compiles one `RawRule` into a `Rule`, or returns the compile error
/// so the caller can log a warning and skip it without failing the
/// whole batch (spec §4.3, §7 class 2).
pub fn compile_rule(raw: RawRule, source: RuleSource) -> Result<Rule, regex::Error> {
    let pattern_text = format!("{}{}", inline_flags(&raw.flags), raw.pattern);
    let compiled = Regex::new(&pattern_text)?;
    Ok(Rule {
        id: raw.id,
        name: raw.name,
        category: raw.category,
        pattern_source: raw.pattern,
        pattern: compiled,
        flags: raw.flags,
        score: raw.score,
        severity: parse_severity(raw.severity.as_deref()),
        tags: raw.tags,
        enabled: raw.enabled,
        source,
        description: raw.description,
    })
}

/// Parses a JSON array of `RawRule` and compiles every entry,
/// collecting `(Rule, warning)` results. Invalid JSON at the top level
/// is the only thing that fails the whole batch — an individual bad
/// rule just gets skipped with a warning.
pub fn parse_rule_file(json: &str, source: RuleSource) -> Result<Vec<Rule>, serde_json::Error> {
    let raws: Vec<RawRule> = serde_json::from_str(json)?;
    let mut rules = Vec::with_capacity(raws.len());
    for raw in raws {
        let id = raw.id.clone();
        match compile_rule(raw, source) {
            Ok(rule) => rules.push(rule),
            Err(e) => {
                tracing::warn!(rule_id = %id, error = %e, "skipping rule with invalid pattern");
            }
        }
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_case_insensitive_by_default() {
        let raw = RawRule {
            id: "r1".into(),
            name: "test".into(),
            category: "custom".into(),
            pattern: "select".into(),
            score: 5.0,
            flags: "gi".into(),
            description: None,
            severity: None,
            tags: vec![],
            enabled: true,
        };
        let rule = compile_rule(raw, RuleSource::Custom).unwrap();
        assert!(rule.pattern.is_match("SELECT * FROM users"));
    }

    #[test]
    fn invalid_pattern_is_skipped_not_fatal() {
        let json = r#"[
            {"id":"bad","name":"bad","category":"x","pattern":"(unclosed","score":1},
            {"id":"good","name":"good","category":"x","pattern":"ok","score":1}
        ]"#;
        let rules = parse_rule_file(json, RuleSource::Imported).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, "good");
    }

    #[test]
    fn every_valid_rule_has_nonnegative_score() {
        let json = r#"[{"id":"r1","name":"n","category":"c","pattern":"x","score":3.5}]"#;
        let rules = parse_rule_file(json, RuleSource::Builtin).unwrap();
        assert!(rules.iter().all(|r| r.is_valid()));
    }
}
