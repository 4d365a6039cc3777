//! The Rule Engine (spec §4.4): aggregates detection-module scores and
//! flat rule matches, then checks the threshold exactly once.

use waf_common::model::{AnalysisRecord, Threat};
use waf_modules::DetectionModule;
use waf_rules::RuleManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Allow,
    Block,
}

pub struct RuleEngineResult {
    pub action: Action,
    /// `(rule_id, category)` for every flat rule that matched, so the
    /// caller can drive `waf_rule_matches_total` without this module
    /// needing to know about metrics.
    pub matched_rules: Vec<(String, String)>,
}

/// Runs every detection module and every enabled flat rule against
/// `record`, recording each match as a threat, then compares the
/// aggregated total against `threshold` a single time (resolving the
/// source's double-check into the one comparison the invariant
/// actually requires — spec §9 open question (a)).
pub async fn analyze(
    record: &mut AnalysisRecord,
    modules: &[Box<dyn DetectionModule>],
    rules: &RuleManager,
    threshold: f64,
) -> RuleEngineResult {
    for module in modules {
        if let Some(finding) = module.analyze(record) {
            for threat in finding.threats {
                record.record_threat(&finding.module, threat);
            }
        }
    }

    let enabled_rules = rules.enabled_rules().await;
    let surface = record.search_surface();
    let mut matched_rules = Vec::new();
    for rule in &enabled_rules {
        for (_, text) in &surface {
            if rule.pattern.is_match(text) {
                let threat = Threat::new(
                    rule.category.clone(),
                    rule.id.clone(),
                    rule.description.clone().unwrap_or_else(|| rule.name.clone()),
                    rule.score,
                    text,
                );
                record.record_threat("rule-engine", threat);
                matched_rules.push((rule.id.clone(), rule.category.clone()));
                break;
            }
        }
    }

    let action = if record.score >= threshold {
        Action::Block
    } else {
        Action::Allow
    };

    RuleEngineResult { action, matched_rules }
}
