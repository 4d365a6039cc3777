//! Already-parsed configuration the core is constructed from.
//!
//! Reading config files (JSON/YAML/env) is an external collaborator
//! (spec §1); this module only defines the shape and the defaults
//! listed in spec §6, so that a loader — or a test — can build one
//! directly.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub window_ms: u64,
    pub max: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: 60_000,
            max: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpBlockingConfig {
    pub enabled: bool,
    pub block_duration_ms: u64,
    pub max_violations: u32,
}

impl Default for IpBlockingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            block_duration_ms: 60 * 60 * 1000,
            max_violations: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub enabled: bool,
    pub retention_days: u32,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: 30,
        }
    }
}

/// Recognized keys from spec §6, with spec-mandated defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WafConfig {
    pub enabled: bool,
    pub dry_run: bool,
    pub threshold: f64,
    pub modules: Vec<String>,
    pub adaptive_learning: bool,
    /// Learning period, in days.
    pub learning_period_days: u64,
    pub anomaly_threshold: f64,
    pub skip_paths: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub ip_blocking: IpBlockingConfig,
    pub community_rules: bool,
    /// HTTPS endpoint for the community rule feed (spec §6). Required
    /// only when `community_rules` and `auto_update` are both set; the
    /// refresh timer is simply never started otherwise.
    pub community_feed_url: Option<String>,
    pub auto_update: bool,
    pub update_interval_ms: u64,
    pub stats: StatsConfig,
    pub max_logs: usize,
    pub api_key: Option<String>,
}

impl Default for WafConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dry_run: false,
            threshold: 10.0,
            modules: vec!["xss".to_string(), "sqli".to_string()],
            adaptive_learning: false,
            learning_period_days: 7,
            // §9(c): anomalyThreshold defaults to 5, not the `|| 5`
            // fallback-on-missing-value the source conflated it with.
            anomaly_threshold: 5.0,
            skip_paths: default_skip_paths(),
            rate_limit: RateLimitConfig::default(),
            ip_blocking: IpBlockingConfig::default(),
            community_rules: false,
            community_feed_url: None,
            auto_update: false,
            update_interval_ms: 86_400_000,
            stats: StatsConfig::default(),
            max_logs: 10_000,
            api_key: None,
        }
    }
}

fn default_skip_paths() -> Vec<String> {
    vec![
        "/health".to_string(),
        "/metrics".to_string(),
        "/favicon.ico".to_string(),
    ]
}

impl WafConfig {
    pub fn should_skip(&self, path: &str) -> bool {
        self.skip_paths.iter().any(|p| p == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = WafConfig::default();
        assert!(!cfg.dry_run);
        assert_eq!(cfg.threshold, 10.0);
        assert_eq!(cfg.modules, vec!["xss", "sqli"]);
        assert_eq!(cfg.anomaly_threshold, 5.0);
        assert_eq!(cfg.update_interval_ms, 86_400_000);
        assert_eq!(cfg.max_logs, 10_000);
        assert!(cfg.community_feed_url.is_none());
        assert!(cfg.should_skip("/health"));
        assert!(!cfg.should_skip("/api/search"));
    }
}
