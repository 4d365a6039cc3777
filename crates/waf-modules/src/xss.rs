//! Cross-site scripting signature module (spec §4.2).

use once_cell::sync::Lazy;
use regex::Regex;
use waf_common::model::{AnalysisRecord, ModuleFinding};

use crate::pattern_set::{scan, ComboRule, PatternRule};
use crate::DetectionModule;

fn rule(id: &'static str, pattern: &str, score: f64, description: &'static str) -> PatternRule {
    PatternRule {
        id,
        regex: Regex::new(pattern).unwrap_or_else(|e| panic!("bad xss pattern {id}: {e}")),
        score,
        threat_type: "xss",
        description,
    }
}

static RULES: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    vec![
        rule(
            "script-tag",
            r"(?is)<script[^>]*>.*?</script>",
            3.0,
            "Script tag injection",
        ),
        rule(
            "script-src",
            r#"(?is)<script[^>]+src\s*=\s*["']?https?://"#,
            3.0,
            "Script tag with external source",
        ),
        rule(
            "scheme-javascript",
            r"(?i)javascript:",
            3.0,
            "javascript: scheme URL",
        ),
        rule("scheme-vbscript", r"(?i)vbscript:", 3.0, "vbscript: scheme URL"),
        rule(
            "scheme-data-html-js",
            r"(?i)data:text/html[^,]*,.*script",
            3.0,
            "data: URL carrying an HTML/script payload",
        ),
        rule(
            "css-expression",
            r"(?i)expression\s*\(",
            3.0,
            "CSS expression() injection",
        ),
        rule(
            "remote-element",
            r"(?i)<(iframe|object|embed|base|link|form)[^>]*>",
            2.0,
            "HTML element with a remote-source capability",
        ),
        rule(
            "meta-refresh",
            r#"(?i)<meta[^>]+http-equiv\s*=\s*["']?refresh"#,
            3.0,
            "meta refresh redirect injection",
        ),
        rule(
            "event-handler",
            r"(?i)\bon\w+\s*=",
            2.0,
            "Inline event-handler attribute",
        ),
        rule("onload", r"(?i)\bonload\s*=", 2.0, "onload handler"),
        rule("onclick", r"(?i)\bonclick\s*=", 2.0, "onclick handler"),
        rule("onerror", r"(?i)\bonerror\s*=", 2.0, "onerror handler"),
        // Payload sinks: these only ever fire in combination with another
        // base indicator (spec §4.2 combination bonuses), so they carry
        // no standalone score of their own — they still appear in the
        // threat list as markers when matched.
        rule("alert", r"(?i)alert\s*\(", 0.0, "alert() sink"),
        rule("confirm", r"(?i)confirm\s*\(", 0.0, "confirm() sink"),
        rule("prompt", r"(?i)prompt\s*\(", 0.0, "prompt() sink"),
        rule(
            "document-cookie",
            r"(?i)document\.cookie",
            0.0,
            "document.cookie access",
        ),
        rule(
            "document-write",
            r"(?i)document\.write\s*\(",
            0.0,
            "document.write() sink",
        ),
        rule("inner-html", r"(?i)innerHTML\s*=", 2.0, "innerHTML assignment"),
        rule("outer-html", r"(?i)outerHTML\s*=", 2.0, "outerHTML assignment"),
        rule(
            "entity-encoded",
            r"(?i)&#x?[0-9a-f]+;",
            1.0,
            "HTML entity-encoded payload",
        ),
        rule("url-encoded", r"(?i)%[0-9a-f]{2}", 1.0, "URL-encoded byte sequence"),
        rule(
            "svg-script",
            r"(?is)<svg[^>]*>.*?<script",
            3.0,
            "SVG carrying an embedded script",
        ),
    ]
});

static COMBOS: Lazy<Vec<ComboRule>> = Lazy::new(|| {
    vec![
        ComboRule {
            id: "script-suspicious-content",
            threat_type: "xss",
            description: "Script tag combined with a payload sink",
            score: 4.0,
            predicate: |ids| {
                ids.contains("script-tag")
                    && (ids.contains("alert")
                        || ids.contains("confirm")
                        || ids.contains("prompt")
                        || ids.contains("document-cookie")
                        || ids.contains("document-write"))
            },
        },
        ComboRule {
            id: "event-handler-javascript-scheme",
            threat_type: "xss",
            description: "Event handler combined with a javascript: scheme URL",
            score: 3.0,
            predicate: |ids| {
                (ids.contains("event-handler")
                    || ids.contains("onload")
                    || ids.contains("onclick")
                    || ids.contains("onerror"))
                    && ids.contains("scheme-javascript")
            },
        },
        ComboRule {
            id: "obfuscated-payload",
            threat_type: "xss",
            description: "Entity-encoded payload combined with a script/alert indicator",
            score: 2.0,
            predicate: |ids| {
                ids.contains("entity-encoded") && (ids.contains("script-tag") || ids.contains("alert"))
            },
        },
    ]
});

pub struct XssModule;

impl DetectionModule for XssModule {
    fn name(&self) -> &'static str {
        "xss"
    }

    fn analyze(&self, record: &AnalysisRecord) -> Option<ModuleFinding> {
        let surface = record.search_surface();
        let (score, threats) = scan(&surface, &RULES, &COMBOS);
        if threats.is_empty() {
            None
        } else {
            Some(ModuleFinding {
                module: "xss".to_string(),
                score,
                threats,
            })
        }
    }
}
