//! `WafCore`: wires the Request Extractor, detection modules, Rule
//! Manager, Anomaly Scorer, Adaptive Learner, and Rate-Limit/IP-Block
//! module into the one pipeline described in spec §2.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Utc};
use waf_anomaly::{AdaptiveLearner, Baseline, LearningPhase};
use waf_common::config::WafConfig;
use waf_common::event::{EventBus, WafEvent};
use waf_common::model::Threat;
use waf_metrics::{MetricsRegistry, StatsCollector, ThreatAction};
use waf_modules::{build_modules, DetectionModule};
use waf_ratelimit::{spawn_sweeper, RateLimitVerdict, RateLimiter};
use waf_rules::{spawn_refresh_timer, HttpCommunityRuleSource, RuleManager};

use crate::decision::{decide, Decision};
use crate::engine::{self, Action};
use crate::extractor::build_record;
use crate::ingress::IngressRequest;

fn phase_label(phase: LearningPhase) -> &'static str {
    match phase {
        LearningPhase::Collecting => "collecting",
        LearningPhase::Analyzing => "analyzing",
        LearningPhase::Adapting => "adapting",
        LearningPhase::Protecting => "protecting",
    }
}

/// Starts the community-rules refresh timer (spec §3, §6, §9) when
/// both `community_rules` and `auto_update` are enabled and a feed URL
/// is configured. Returns `None` otherwise — e.g. when the feature is
/// off, or misconfigured, in which case startup logs a warning rather
/// than failing (spec §7 class 1).
fn spawn_community_refresh(config: &WafConfig, rules: RuleManager) -> Option<Arc<AtomicBool>> {
    if !(config.community_rules && config.auto_update) {
        return None;
    }
    let Some(url) = config.community_feed_url.clone() else {
        tracing::warn!("community_rules auto_update is enabled but no community_feed_url is configured; refresh timer not started");
        return None;
    };
    let source = Arc::new(HttpCommunityRuleSource::new(url));
    let interval = StdDuration::from_millis(config.update_interval_ms.max(1));
    Some(spawn_refresh_timer(rules, source, interval))
}

/// Coarse severity bucket derived from a threat's own score, for the
/// `waf_threats_total{type,severity}` label (spec §6) — threats raised
/// by detection modules and the anomaly scorer carry a score but no
/// `Rule`-style `Severity`, so the bucket is read off the score itself.
fn severity_label(score: f64) -> &'static str {
    if score >= 10.0 {
        "critical"
    } else if score >= 5.0 {
        "high"
    } else if score >= 2.0 {
        "medium"
    } else {
        "low"
    }
}

pub struct WafCore {
    config: WafConfig,
    modules: Vec<Box<dyn DetectionModule>>,
    rules: RuleManager,
    baseline: Baseline,
    learner: AdaptiveLearner,
    rate_limiter: Arc<RateLimiter>,
    pub metrics: MetricsRegistry,
    pub stats: StatsCollector,
    pub events: EventBus,
    /// Shutdown flags for the background tasks spawned in `new`/
    /// `with_start_time` (block-table sweeper, community-rules refresh
    /// timer) — spec §9 "independent periodic tasks, cancellable at
    /// shutdown".
    background: Vec<Arc<AtomicBool>>,
}

impl WafCore {
    pub fn new(config: WafConfig) -> Self {
        Self::with_start_time(config, Utc::now())
    }

    /// Exposed separately so tests can pin the learner's clock (spec §8
    /// scenario 6 requires fast-forwarding past the learning period).
    pub fn with_start_time(config: WafConfig, start_time: DateTime<Utc>) -> Self {
        let modules = build_modules(&config.modules);
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone(), config.ip_blocking.clone()));
        let rules = RuleManager::new();
        let learner = AdaptiveLearner::new(config.adaptive_learning, start_time, config.learning_period_days);
        let metrics = MetricsRegistry::new().expect("static metric family definitions are always valid");

        let mut background = vec![spawn_sweeper(rate_limiter.clone())];
        if let Some(handle) = spawn_community_refresh(&config, rules.clone()) {
            background.push(handle);
        }

        Self {
            config,
            modules,
            rules,
            baseline: Baseline::new(),
            learner,
            rate_limiter,
            metrics,
            stats: StatsCollector::new(),
            events: EventBus::new(),
            background,
        }
    }

    pub fn rules(&self) -> &RuleManager {
        &self.rules
    }

    /// Stops every background task spawned alongside this core (sweeper,
    /// community-rules refresh timer). Idempotent.
    pub fn shutdown(&self) {
        for flag in &self.background {
            flag.store(true, Ordering::Relaxed);
        }
    }

    pub async fn analyze_request(&self, req: &dyn IngressRequest) -> Decision {
        if !self.config.enabled || self.config.should_skip(req.path()) {
            return Decision::Allow;
        }

        let now = req.timestamp();
        match self.analyze_inner(req, now).await {
            Ok(decision) => decision,
            Err(message) => {
                tracing::error!(error = %message, "core analysis failed, failing open");
                self.events.emit(WafEvent::Error {
                    request_id: None,
                    message,
                    timestamp: now,
                });
                Decision::Allow
            }
        }
    }

    async fn analyze_inner(&self, req: &dyn IngressRequest, now: DateTime<Utc>) -> Result<Decision, String> {
        let started = Instant::now();
        let mut record = build_record(req);
        self.stats.record_request(now);

        let rl_verdict = self.rate_limiter.check(&record.ip, now);
        let mut rate_limited_block = false;
        match rl_verdict {
            RateLimitVerdict::Allowed => {}
            RateLimitVerdict::RateLimited(threat) => {
                self.metrics.rate_limit_hits_total.with_label_values(&[&record.ip]).inc();
                record.record_threat("ratelimit", threat);
            }
            RateLimitVerdict::IpBlocked(threat) => {
                self.metrics.ip_blocks_total.with_label_values(&["active-block"]).inc();
                record.record_threat("ratelimit", threat);
                rate_limited_block = true;
            }
        }

        let engine_result =
            engine::analyze(&mut record, &self.modules, &self.rules, self.config.threshold).await;
        for (rule_id, category) in &engine_result.matched_rules {
            self.metrics
                .rule_matches_total
                .with_label_values(&[rule_id, category])
                .inc();
        }

        let phase = self.learner.phase(now);
        let body_len = record.body.as_scan_text().len();
        if phase != LearningPhase::Protecting {
            self.baseline
                .record(&record.path, record.user_agent.as_deref(), body_len);
        }
        // Per-IP frequency is the one baseline facet that stays live in
        // Protecting (spec §4.5) — `score` itself bumps it unconditionally
        // via the frequency factor, so no separate call is needed here.

        let anomaly = waf_anomaly::score(&record, &self.baseline, self.config.anomaly_threshold);
        if anomaly.total_score > 0.0 {
            record.record_threat(
                "anomaly",
                Threat::new(
                    "anomaly",
                    "baseline-deviation",
                    "Request deviates from the learned traffic baseline",
                    anomaly.total_score,
                    &record.path,
                ),
            );
        }
        self.metrics.anomaly_score_summary.observe(anomaly.total_score);

        for threat in &record.threats {
            self.metrics
                .threats_total
                .with_label_values(&[&threat.threat_type, severity_label(threat.score)])
                .inc();
        }

        self.learner
            .observe(now, &record.ip, body_len, record.score, &record.modules_touched);

        self.metrics
            .learning_requests_total
            .with_label_values(&[phase_label(phase)])
            .inc();
        self.metrics
            .learning_progress
            .with_label_values(&[phase_label(phase)])
            .set(self.learner.progress(now));
        self.metrics.blocked_ips.set(self.rate_limiter.blocked_ip_count() as f64);
        let rule_stats = self.rules.stats().await;
        for (category, count) in &rule_stats.enabled_by_category {
            self.metrics
                .rules_enabled
                .with_label_values(&[category])
                .set(*count as f64);
        }

        let (decision, event) = decide(
            &record,
            engine_result.action,
            rate_limited_block,
            anomaly.total_score,
            phase,
            self.config.dry_run,
        );

        if let Some(event) = event {
            self.events.emit(event);
        }

        let would_block = rate_limited_block || engine_result.action == Action::Block;
        if phase != LearningPhase::Protecting {
            self.stats.record_threat(&record, ThreatAction::Learning);
        } else if matches!(decision, Decision::Block(_)) {
            self.stats.record_threat(&record, ThreatAction::Blocked);
            let modules = record.modules_touched.join(",");
            self.metrics
                .blocks_total
                .with_label_values(&["threshold-exceeded", &modules])
                .inc();
        } else if self.config.dry_run && would_block {
            self.stats.record_threat(&record, ThreatAction::DryRun);
        }

        let status_label = match &decision {
            Decision::Allow => "200",
            Decision::Block(_) => "403",
        };
        self.metrics
            .requests_total
            .with_label_values(&[&record.method, status_label])
            .inc();
        self.metrics
            .request_duration_seconds
            .with_label_values(&[&record.method, status_label])
            .observe(started.elapsed().as_secs_f64());

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Duration;
    use waf_common::model::{Body, FieldValue, QueryValue};

    use super::*;

    struct FakeRequest {
        path: String,
        query: HashMap<String, QueryValue>,
        ip: String,
        timestamp: DateTime<Utc>,
    }

    impl IngressRequest for FakeRequest {
        fn method(&self) -> &str {
            "GET"
        }
        fn path(&self) -> &str {
            &self.path
        }
        fn peer_addr(&self) -> Option<&str> {
            Some(&self.ip)
        }
        fn headers(&self) -> &HashMap<String, FieldValue> {
            static EMPTY: std::sync::OnceLock<HashMap<String, FieldValue>> = std::sync::OnceLock::new();
            EMPTY.get_or_init(HashMap::new)
        }
        fn cookies(&self) -> &HashMap<String, FieldValue> {
            self.headers()
        }
        fn query(&self) -> &HashMap<String, QueryValue> {
            &self.query
        }
        fn body(&self) -> &Body {
            static EMPTY: Body = Body::Empty;
            &EMPTY
        }
        fn timestamp(&self) -> DateTime<Utc> {
            self.timestamp
        }
    }

    fn xss_request(ip: &str) -> FakeRequest {
        let mut query = HashMap::new();
        query.insert(
            "q".to_string(),
            QueryValue::Single(r#"<script>alert("xss")</script>"#.to_string()),
        );
        FakeRequest {
            path: "/api/search".to_string(),
            query,
            ip: ip.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn blocks_xss_payload_above_threshold() {
        let mut config = WafConfig::default();
        config.modules = vec!["xss".to_string()];
        config.threshold = 5.0;
        let core = WafCore::with_start_time(config, Utc::now() - Duration::days(30));

        let decision = core.analyze_request(&xss_request("1.2.3.4")).await;
        assert!(matches!(decision, Decision::Block(_)));
    }

    #[tokio::test]
    async fn learning_mode_always_allows_then_blocks_after_period() {
        let mut config = WafConfig::default();
        config.modules = vec!["xss".to_string()];
        config.threshold = 5.0;
        config.adaptive_learning = true;
        config.learning_period_days = 7;

        let start = Utc::now();
        let core = WafCore::with_start_time(config, start);
        let mut early_request = xss_request("1.2.3.4");
        early_request.timestamp = start;
        let decision = core.analyze_request(&early_request).await;
        assert!(matches!(decision, Decision::Allow));

        let mut late_request = xss_request("1.2.3.4");
        late_request.timestamp = start + Duration::days(8);
        let decision = core.analyze_request(&late_request).await;
        assert!(matches!(decision, Decision::Block(_)));
    }

    #[tokio::test]
    async fn skip_paths_bypass_the_pipeline() {
        let config = WafConfig::default();
        let core = WafCore::with_start_time(config, Utc::now() - Duration::days(30));
        let request = FakeRequest {
            path: "/health".to_string(),
            query: HashMap::new(),
            ip: "1.2.3.4".to_string(),
            timestamp: Utc::now(),
        };
        let decision = core.analyze_request(&request).await;
        assert!(matches!(decision, Decision::Allow));
    }

    #[tokio::test]
    async fn analysis_observes_request_duration_histogram() {
        let config = WafConfig::default();
        let core = WafCore::with_start_time(config, Utc::now() - Duration::days(30));
        core.analyze_request(&xss_request("6.6.6.6")).await;

        let rendered = core.metrics.render().unwrap();
        assert!(rendered.contains("waf_request_duration_seconds_count"));
        assert!(rendered.contains("waf_request_duration_seconds_bucket"));
        assert!(rendered.contains(r#"le="+Inf""#));
    }

    #[tokio::test]
    async fn community_refresh_timer_is_not_started_without_a_feed_url() {
        let mut config = WafConfig::default();
        config.community_rules = true;
        config.auto_update = true;
        config.community_feed_url = None;
        let core = WafCore::with_start_time(config, Utc::now());
        // Only the sweeper background task should have been started.
        assert_eq!(core.background.len(), 1);
    }

    #[tokio::test]
    async fn community_refresh_timer_starts_when_fully_configured() {
        let mut config = WafConfig::default();
        config.community_rules = true;
        config.auto_update = true;
        config.community_feed_url = Some("https://example.invalid/rules.json".to_string());
        let core = WafCore::with_start_time(config, Utc::now());
        assert_eq!(core.background.len(), 2);
        core.shutdown();
    }
}
