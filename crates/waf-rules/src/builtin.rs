//! Embedded builtin rule catalog (spec §4.3): loadable even when no
//! external rules file is present on disk.

use crate::load::RawRule;

/// The catalog is a plain Rust literal, not a file read off disk, so it
/// is always available regardless of deployment filesystem layout.
pub fn catalog() -> Vec<RawRule> {
    vec![
        RawRule {
            id: "builtin-sql-union-select".into(),
            name: "SQL UNION SELECT".into(),
            category: "sqli".into(),
            pattern: r"(?i)union(\s+all)?\s+select".into(),
            score: 4.0,
            flags: "gi".into(),
            description: Some("UNION-based SQL injection attempt".into()),
            severity: Some("high".into()),
            tags: vec!["sqli".into(), "builtin".into()],
            enabled: true,
        },
        RawRule {
            id: "builtin-sql-drop-table".into(),
            name: "SQL DROP TABLE".into(),
            category: "sqli".into(),
            pattern: r"(?i)drop\s+table".into(),
            score: 5.0,
            flags: "gi".into(),
            description: Some("Destructive DDL statement".into()),
            severity: Some("critical".into()),
            tags: vec!["sqli".into(), "builtin".into()],
            enabled: true,
        },
        RawRule {
            id: "builtin-xss-script-tag".into(),
            name: "XSS script tag".into(),
            category: "xss".into(),
            pattern: r"(?i)<script\b[^>]*>".into(),
            score: 3.0,
            flags: "gi".into(),
            description: Some("Inline script tag injection".into()),
            severity: Some("high".into()),
            tags: vec!["xss".into(), "builtin".into()],
            enabled: true,
        },
        RawRule {
            id: "builtin-xss-javascript-scheme".into(),
            name: "XSS javascript: scheme".into(),
            category: "xss".into(),
            pattern: r"(?i)javascript:".into(),
            score: 3.0,
            flags: "gi".into(),
            description: Some("javascript: URI scheme".into()),
            severity: Some("high".into()),
            tags: vec!["xss".into(), "builtin".into()],
            enabled: true,
        },
        RawRule {
            id: "builtin-traversal-dotdot".into(),
            name: "Path traversal".into(),
            category: "path-traversal".into(),
            pattern: r"\.\./|\.\.\\".into(),
            score: 3.0,
            flags: "g".into(),
            description: Some("Directory traversal sequence".into()),
            severity: Some("medium".into()),
            tags: vec!["path-traversal".into(), "builtin".into()],
            enabled: true,
        },
        RawRule {
            id: "builtin-cmd-shell-chain".into(),
            name: "Shell command chaining".into(),
            category: "cmd-injection".into(),
            pattern: r"[;&|]\s*(cat|ls|rm|wget|curl)\b".into(),
            score: 5.0,
            flags: "gi".into(),
            description: Some("Shell metacharacter chained command".into()),
            severity: Some("critical".into()),
            tags: vec!["cmd-injection".into(), "builtin".into()],
            enabled: true,
        },
    ]
}
