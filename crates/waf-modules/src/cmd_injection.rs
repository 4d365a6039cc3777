//! Command-injection signature module (spec §4.2 supplement).

use once_cell::sync::Lazy;
use regex::Regex;
use waf_common::model::{AnalysisRecord, ModuleFinding};

use crate::pattern_set::{scan, ComboRule, PatternRule};
use crate::DetectionModule;

fn rule(id: &'static str, pattern: &str, score: f64, description: &'static str) -> PatternRule {
    PatternRule {
        id,
        regex: Regex::new(pattern).unwrap_or_else(|e| panic!("bad cmd-injection pattern {id}: {e}")),
        score,
        threat_type: "cmd-injection",
        description,
    }
}

static RULES: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    vec![
        rule(
            "shell-chain",
            r"[;&|]\s*(cat|ls|rm|wget|curl|nc|id|whoami)\b",
            5.0,
            "Shell metacharacter chained with a command",
        ),
        rule(
            "backtick-subshell",
            r"`[^`]+`|\$\([^)]+\)",
            5.0,
            "Command substitution subshell",
        ),
        rule(
            "recon-binary",
            r"(?i)\b(wget|curl|nc|/bin/sh|/bin/bash|netcat)\b",
            2.0,
            "Reconnaissance binary reference",
        ),
        rule(
            "windows-shell",
            r"(?i)\bcmd\.exe\b|\bpowershell\b",
            3.0,
            "Windows shell reference",
        ),
    ]
});

static COMBOS: Lazy<Vec<ComboRule>> = Lazy::new(|| {
    vec![ComboRule {
        id: "shell-chain-recon",
        threat_type: "cmd-injection",
        description: "Shell chain combined with a reconnaissance binary",
        score: 3.0,
        predicate: |ids| ids.contains("shell-chain") && ids.contains("recon-binary"),
    }]
});

pub struct CmdInjectionModule;

impl DetectionModule for CmdInjectionModule {
    fn name(&self) -> &'static str {
        "cmd-injection"
    }

    fn analyze(&self, record: &AnalysisRecord) -> Option<ModuleFinding> {
        let surface = record.search_surface();
        let (score, threats) = scan(&surface, &RULES, &COMBOS);
        if threats.is_empty() {
            None
        } else {
            Some(ModuleFinding {
                module: "cmd-injection".to_string(),
                score,
                threats,
            })
        }
    }
}
