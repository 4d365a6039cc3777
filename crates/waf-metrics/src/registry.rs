//! The Prometheus-backed metrics registry (spec §4.8, §6).
//!
//! Counter/gauge/histogram *semantics* — which families exist, their
//! labels, when they're bumped — belong to this module, per spec. Text
//! rendering for those three kinds is delegated to
//! `prometheus::TextEncoder`; the one family kind `prometheus` has no
//! equivalent for, `summary`, is hand-rolled in [`crate::summary`] and
//! appended after the encoded output.

use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

use crate::summary::Summary;

const DURATION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0];

pub struct MetricsRegistry {
    registry: Registry,
    pub requests_total: CounterVec,
    pub threats_total: CounterVec,
    pub blocks_total: CounterVec,
    pub learning_requests_total: CounterVec,
    pub rule_matches_total: CounterVec,
    pub ip_blocks_total: CounterVec,
    pub rate_limit_hits_total: CounterVec,
    pub blocked_ips: Gauge,
    pub learning_progress: GaugeVec,
    pub rules_enabled: GaugeVec,
    pub request_duration_seconds: HistogramVec,
    /// Supplement: per-request anomaly score distribution. `prometheus`
    /// has no summary type, so this is the hand-rolled kind from
    /// `crate::summary`.
    pub anomaly_score_summary: Summary,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("waf_requests_total", "Total requests seen by the core"),
            &["method", "status"],
        )?;
        let threats_total = CounterVec::new(
            Opts::new("waf_threats_total", "Total threats detected"),
            &["type", "severity"],
        )?;
        let blocks_total = CounterVec::new(
            Opts::new("waf_blocks_total", "Total requests blocked"),
            &["reason", "module"],
        )?;
        let learning_requests_total = CounterVec::new(
            Opts::new(
                "waf_learning_requests_total",
                "Requests observed while the adaptive learner was active",
            ),
            &["phase"],
        )?;
        let rule_matches_total = CounterVec::new(
            Opts::new("waf_rule_matches_total", "Rule Manager rule matches"),
            &["rule_id", "category"],
        )?;
        let ip_blocks_total = CounterVec::new(
            Opts::new("waf_ip_blocks_total", "IPs moved into the block table"),
            &["reason"],
        )?;
        let rate_limit_hits_total = CounterVec::new(
            Opts::new("waf_rate_limit_hits_total", "Rate-limit window violations"),
            &["ip"],
        )?;
        let blocked_ips = Gauge::new("waf_blocked_ips", "IPs currently in the block table")?;
        let learning_progress = GaugeVec::new(
            Opts::new("waf_learning_progress", "Fraction of the learning period elapsed"),
            &["phase"],
        )?;
        let rules_enabled = GaugeVec::new(
            Opts::new("waf_rules_enabled", "Enabled rule count by category"),
            &["category"],
        )?;
        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "waf_request_duration_seconds",
                "Core analysis duration per request",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["method", "status"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(threats_total.clone()))?;
        registry.register(Box::new(blocks_total.clone()))?;
        registry.register(Box::new(learning_requests_total.clone()))?;
        registry.register(Box::new(rule_matches_total.clone()))?;
        registry.register(Box::new(ip_blocks_total.clone()))?;
        registry.register(Box::new(rate_limit_hits_total.clone()))?;
        registry.register(Box::new(blocked_ips.clone()))?;
        registry.register(Box::new(learning_progress.clone()))?;
        registry.register(Box::new(rules_enabled.clone()))?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            threats_total,
            blocks_total,
            learning_requests_total,
            rule_matches_total,
            ip_blocks_total,
            rate_limit_hits_total,
            blocked_ips,
            learning_progress,
            rules_enabled,
            request_duration_seconds,
            anomaly_score_summary: Summary::new(
                "waf_anomaly_score",
                "Per-request anomaly score distribution",
            ),
        })
    }

    /// Renders every family in standard text exposition format: the
    /// `prometheus`-encoded counter/gauge/histogram families, followed
    /// by the hand-rendered summary.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        let mut text = String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))?;
        text.push_str(&self.anomaly_score_summary.render());
        Ok(text)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new().expect("static metric family definitions are always valid")
    }
}
