//! Decision & Event Emission (spec §4.9): combines the rule-engine
//! verdict, the learning phase, and dry-run configuration into the
//! final allow/block outcome.

use chrono::{DateTime, Utc};
use serde::Serialize;
use waf_anomaly::LearningPhase;
use waf_common::event::{ThreatEventKind, WafEvent};
use waf_common::model::{AnalysisRecord, Threat};

use crate::engine::Action;

/// The 403 JSON body shape from spec §4.9.
#[derive(Debug, Clone, Serialize)]
pub struct BlockResponse {
    pub error: &'static str,
    pub reason: String,
    pub request_id: String,
    pub score: f64,
    pub anomaly_score: f64,
    pub threats: Vec<Threat>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum Decision {
    Allow,
    Block(BlockResponse),
}

/// Applies the §4.9 decision table. `rate_limited_block` forces a
/// block regardless of score when the IP is already serving an active
/// block (spec §2 step 6: "short-circuits to block for already-blocked
/// IPs").
#[allow(clippy::too_many_arguments)]
pub fn decide(
    record: &AnalysisRecord,
    rule_engine_action: Action,
    rate_limited_block: bool,
    anomaly_score: f64,
    phase: LearningPhase,
    dry_run: bool,
) -> (Decision, Option<WafEvent>) {
    if phase != LearningPhase::Protecting {
        let event = (record.score > 0.0).then(|| WafEvent::ThreatDetected {
            request_id: record.request_id.clone(),
            kind: ThreatEventKind::Learning,
            ip: record.ip.clone(),
            path: record.path.clone(),
            score: record.score,
            threats: record.threats.clone(),
            timestamp: record.timestamp,
        });
        return (Decision::Allow, event);
    }

    let would_block = rate_limited_block || rule_engine_action == Action::Block;

    if !would_block {
        return (Decision::Allow, None);
    }

    if dry_run {
        let event = WafEvent::ThreatDetected {
            request_id: record.request_id.clone(),
            kind: ThreatEventKind::DryRun,
            ip: record.ip.clone(),
            path: record.path.clone(),
            score: record.score,
            threats: record.threats.clone(),
            timestamp: record.timestamp,
        };
        return (Decision::Allow, Some(event));
    }

    let response = BlockResponse {
        error: "request blocked",
        reason: "threat score exceeded the configured threshold".to_string(),
        request_id: record.request_id.clone(),
        score: record.score,
        anomaly_score,
        threats: record.threats.clone(),
        timestamp: record.timestamp,
    };
    let event = WafEvent::RequestBlocked {
        request_id: record.request_id.clone(),
        ip: record.ip.clone(),
        path: record.path.clone(),
        score: record.score,
        threats: record.threats.clone(),
        timestamp: record.timestamp,
    };
    (Decision::Block(response), Some(event))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use waf_common::model::Body;

    use super::*;

    fn record(score: f64) -> AnalysisRecord {
        AnalysisRecord {
            request_id: "r1".into(),
            timestamp: Utc::now(),
            ip: "1.2.3.4".into(),
            user_agent: None,
            method: "GET".into(),
            path: "/".into(),
            query: HashMap::new(),
            body: Body::Empty,
            headers: HashMap::new(),
            cookies: HashMap::new(),
            score,
            threats: Vec::new(),
            modules_touched: Vec::new(),
        }
    }

    #[test]
    fn non_protecting_phase_always_allows() {
        let r = record(20.0);
        let (decision, event) = decide(&r, Action::Block, false, 0.0, LearningPhase::Collecting, false);
        assert!(matches!(decision, Decision::Allow));
        assert!(matches!(event, Some(WafEvent::ThreatDetected { kind: ThreatEventKind::Learning, .. })));
    }

    #[test]
    fn dry_run_allows_and_emits_dry_run_event() {
        let r = record(20.0);
        let (decision, event) = decide(&r, Action::Block, false, 0.0, LearningPhase::Protecting, true);
        assert!(matches!(decision, Decision::Allow));
        assert!(matches!(event, Some(WafEvent::ThreatDetected { kind: ThreatEventKind::DryRun, .. })));
    }

    #[test]
    fn protecting_phase_blocks_over_threshold() {
        let r = record(20.0);
        let (decision, event) = decide(&r, Action::Block, false, 0.0, LearningPhase::Protecting, false);
        assert!(matches!(decision, Decision::Block(_)));
        assert!(matches!(event, Some(WafEvent::RequestBlocked { .. })));
    }

    #[test]
    fn ip_block_forces_block_even_with_low_score() {
        let r = record(0.0);
        let (decision, _) = decide(&r, Action::Allow, true, 0.0, LearningPhase::Protecting, false);
        assert!(matches!(decision, Decision::Block(_)));
    }

    #[test]
    fn under_threshold_allows_with_no_event() {
        let r = record(0.0);
        let (decision, event) = decide(&r, Action::Allow, false, 0.0, LearningPhase::Protecting, false);
        assert!(matches!(decision, Decision::Allow));
        assert!(event.is_none());
    }
}
