//! The `RuleManager`: single-writer/many-reader keyed rule store
//! (spec §4.3, §5).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use waf_common::error::WafError;
use waf_common::model::{Rule, RuleSource};

use crate::builtin;
use crate::load::{compile_rule, parse_rule_file, RawRule};

/// A partial update applied by `RuleManager::update`. `None` fields
/// leave the corresponding value unchanged. Per the immutable-pattern
/// invariant, applying a delta never mutates the existing `Rule` in
/// place — it builds a replacement and swaps it in wholesale.
#[derive(Debug, Clone, Default)]
pub struct RuleDelta {
    pub name: Option<String>,
    pub category: Option<String>,
    pub pattern: Option<String>,
    pub flags: Option<String>,
    pub score: Option<f64>,
    pub description: Option<Option<String>>,
    pub severity: Option<String>,
    pub tags: Option<Vec<String>>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct SourceCounts {
    pub builtin: usize,
    pub custom: usize,
    pub community: usize,
    pub imported: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleManagerStats {
    pub total_rules: usize,
    pub enabled_rules: usize,
    pub by_category: HashMap<String, usize>,
    pub enabled_by_category: HashMap<String, usize>,
    pub by_source: SourceCounts,
}

/// A plain-data mirror of `Rule` used for JSON export, since `Rule`
/// itself carries a compiled `Regex` that cannot be serialized.
#[derive(Debug, Clone, Serialize)]
pub struct ExportedRule {
    pub id: String,
    pub name: String,
    pub category: String,
    pub pattern: String,
    pub score: f64,
    pub severity: String,
    pub tags: Vec<String>,
    pub enabled: bool,
    pub source: &'static str,
    pub description: Option<String>,
    pub flags: String,
}

impl From<&Rule> for ExportedRule {
    fn from(r: &Rule) -> Self {
        Self {
            id: r.id.clone(),
            name: r.name.clone(),
            category: r.category.clone(),
            pattern: r.pattern_source.clone(),
            score: r.score,
            severity: format!("{:?}", r.severity).to_lowercase(),
            tags: r.tags.clone(),
            enabled: r.enabled,
            source: source_label(r.source),
            description: r.description.clone(),
            flags: r.flags.clone(),
        }
    }
}

fn source_label(s: RuleSource) -> &'static str {
    match s {
        RuleSource::Builtin => "builtin",
        RuleSource::Custom => "custom",
        RuleSource::Community => "community",
        RuleSource::Imported => "imported",
    }
}

/// Abstracts the community rule feed transport (spec §1 external
/// collaborator) so `RuleManager::refresh_community` can be tested
/// against an in-memory fake instead of a real HTTPS endpoint.
#[async_trait]
pub trait CommunityRuleSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawRule>, WafError>;
}

struct RuleStore {
    rules: HashMap<String, Rule>,
}

/// Keyed collection of compiled rules, shared across the request path
/// via cheap clones of the inner `Arc`.
#[derive(Clone)]
pub struct RuleManager {
    inner: Arc<RwLock<RuleStore>>,
}

impl RuleManager {
    /// Loads the embedded builtin catalog. Always succeeds even if a
    /// pattern in the catalog were malformed — bad entries are skipped
    /// with a warning, never fatal at startup.
    pub fn new() -> Self {
        let mut rules = HashMap::new();
        for raw in builtin::catalog() {
            let id = raw.id.clone();
            match compile_rule(raw, RuleSource::Builtin) {
                Ok(rule) => {
                    rules.insert(id, rule);
                }
                Err(e) => {
                    tracing::warn!(rule_id = %id, error = %e, "builtin rule failed to compile");
                }
            }
        }
        Self {
            inner: Arc::new(RwLock::new(RuleStore { rules })),
        }
    }

    /// Empty manager, for tests that want full control over seed state.
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RuleStore {
                rules: HashMap::new(),
            })),
        }
    }

    pub async fn get(&self, id: &str) -> Option<Rule> {
        self.inner.read().await.rules.get(id).cloned()
    }

    /// All enabled rules, for the rule engine's aggregation pass.
    pub async fn enabled_rules(&self) -> Vec<Rule> {
        self.inner
            .read()
            .await
            .rules
            .values()
            .filter(|r| r.enabled)
            .cloned()
            .collect()
    }

    pub async fn add(&self, raw: RawRule, source: RuleSource) -> Result<(), WafError> {
        let id = raw.id.clone();
        let rule = compile_rule(raw, source).map_err(|e| WafError::RuleCompile {
            id: id.clone(),
            reason: e.to_string(),
        })?;
        self.inner.write().await.rules.insert(id, rule);
        Ok(())
    }

    /// Loads a JSON rule file, adding every rule that compiles. Invalid
    /// entries are skipped with a warning without failing the batch;
    /// only malformed top-level JSON is an error.
    pub async fn load_file(&self, json: &str, source: RuleSource) -> Result<usize, WafError> {
        let rules = parse_rule_file(json, source).map_err(|e| WafError::Config(e.to_string()))?;
        let count = rules.len();
        let mut store = self.inner.write().await;
        for rule in rules {
            store.rules.insert(rule.id.clone(), rule);
        }
        Ok(count)
    }

    /// Only `Custom`-sourced rules may be deleted (spec §4.3) — builtin,
    /// community, and imported rules are managed through their own
    /// lifecycle (catalog load, refresh, re-import).
    pub async fn delete(&self, id: &str) -> Result<(), WafError> {
        let mut store = self.inner.write().await;
        match store.rules.get(id) {
            None => Err(WafError::Internal(format!("rule not found: {id}"))),
            Some(rule) if rule.source != RuleSource::Custom => Err(WafError::Internal(format!(
                "rule {id} is not a custom rule and cannot be deleted"
            ))),
            Some(_) => {
                store.rules.remove(id);
                Ok(())
            }
        }
    }

    /// Applies `delta` by building a full replacement `Rule` and
    /// swapping it in; never mutates fields of the existing rule.
    pub async fn update(&self, id: &str, delta: RuleDelta) -> Result<(), WafError> {
        let mut store = self.inner.write().await;
        let existing = store
            .rules
            .get(id)
            .ok_or_else(|| WafError::Internal(format!("rule not found: {id}")))?;

        let raw = RawRule {
            id: id.to_string(),
            name: delta.name.unwrap_or_else(|| existing.name.clone()),
            category: delta.category.unwrap_or_else(|| existing.category.clone()),
            pattern: delta.pattern.unwrap_or_else(|| existing.pattern_source.clone()),
            score: delta.score.unwrap_or(existing.score),
            flags: delta.flags.unwrap_or_else(|| existing.flags.clone()),
            description: delta.description.unwrap_or_else(|| existing.description.clone()),
            severity: Some(delta.severity.unwrap_or_else(|| source_severity_label(existing))),
            tags: delta.tags.unwrap_or_else(|| existing.tags.clone()),
            enabled: delta.enabled.unwrap_or(existing.enabled),
        };
        let source = existing.source;
        let rule = compile_rule(raw, source).map_err(|e| WafError::RuleCompile {
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        store.rules.insert(id.to_string(), rule);
        Ok(())
    }

    pub async fn toggle(&self, id: &str, enabled: bool) -> Result<(), WafError> {
        let mut store = self.inner.write().await;
        let rule = store
            .rules
            .get_mut(id)
            .ok_or_else(|| WafError::Internal(format!("rule not found: {id}")))?;
        rule.enabled = enabled;
        Ok(())
    }

    pub async fn import(&self, json: &str) -> Result<usize, WafError> {
        self.load_file(json, RuleSource::Imported).await
    }

    /// Exports all rules, optionally filtered to one category, as a
    /// JSON array matching the rule file format.
    pub async fn export(&self, category: Option<&str>) -> Result<String, WafError> {
        let store = self.inner.read().await;
        let exported: Vec<ExportedRule> = store
            .rules
            .values()
            .filter(|r| category.map_or(true, |c| r.category == c))
            .map(ExportedRule::from)
            .collect();
        serde_json::to_string_pretty(&exported).map_err(|e| WafError::Internal(e.to_string()))
    }

    /// Adds any fetched rule whose id isn't already present; existing
    /// rules (community or otherwise) are left untouched (spec §6: "new
    /// rules (id not present) are added, existing ones untouched").
    pub async fn refresh_community(
        &self,
        source: &dyn CommunityRuleSource,
    ) -> Result<usize, WafError> {
        let fetched = source.fetch().await?;
        let mut store = self.inner.write().await;
        let mut added = 0;
        for raw in fetched {
            let id = raw.id.clone();
            if store.rules.contains_key(&id) {
                continue;
            }
            match compile_rule(raw, RuleSource::Community) {
                Ok(rule) => {
                    store.rules.insert(id, rule);
                    added += 1;
                }
                Err(e) => {
                    tracing::warn!(rule_id = %id, error = %e, "community rule failed to compile");
                }
            }
        }
        Ok(added)
    }

    pub async fn stats(&self) -> RuleManagerStats {
        let store = self.inner.read().await;
        let mut by_category: HashMap<String, usize> = HashMap::new();
        let mut enabled_by_category: HashMap<String, usize> = HashMap::new();
        let mut by_source = SourceCounts::default();
        let mut enabled = 0;
        for rule in store.rules.values() {
            *by_category.entry(rule.category.clone()).or_insert(0) += 1;
            if rule.enabled {
                enabled += 1;
                *enabled_by_category.entry(rule.category.clone()).or_insert(0) += 1;
            }
            match rule.source {
                RuleSource::Builtin => by_source.builtin += 1,
                RuleSource::Custom => by_source.custom += 1,
                RuleSource::Community => by_source.community += 1,
                RuleSource::Imported => by_source.imported += 1,
            }
        }
        RuleManagerStats {
            total_rules: store.rules.len(),
            enabled_rules: enabled,
            by_category,
            enabled_by_category,
            by_source,
        }
    }
}

impl Default for RuleManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the periodic community-rules refresh task (spec §3 "fetch
/// remote JSON … on a periodic timer", §6 "polled at a configurable
/// interval", §9 "independent periodic tasks").
///
/// Mirrors `waf_ratelimit::spawn_sweeper`'s shape: a plain
/// `Arc<AtomicBool>` shutdown flag, ticked with `tokio::time::interval`
/// so the lock inside `refresh_community` is released before sleeping.
pub fn spawn_refresh_timer(
    manager: RuleManager,
    source: Arc<dyn CommunityRuleSource>,
    interval: StdDuration,
) -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handle = shutdown.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip the startup fetch
        loop {
            ticker.tick().await;
            if shutdown_handle.load(Ordering::Relaxed) {
                break;
            }
            match manager.refresh_community(source.as_ref()).await {
                Ok(added) => {
                    if added > 0 {
                        tracing::info!(added, "community rule refresh added new rules");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "community rule refresh failed, retrying next tick");
                }
            }
        }
    });
    shutdown
}

fn source_severity_label(rule: &Rule) -> String {
    format!("{:?}", rule.severity).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, score: f64) -> RawRule {
        RawRule {
            id: id.to_string(),
            name: "custom rule".into(),
            category: "custom".into(),
            pattern: "foo".into(),
            score,
            flags: "gi".into(),
            description: None,
            severity: None,
            tags: vec![],
            enabled: true,
        }
    }

    #[tokio::test]
    async fn builtin_catalog_loads_on_new() {
        let mgr = RuleManager::new();
        let stats = mgr.stats().await;
        assert!(stats.total_rules > 0);
        assert_eq!(stats.by_source.builtin, stats.total_rules);
    }

    #[tokio::test]
    async fn add_then_delete_restores_empty() {
        let mgr = RuleManager::empty();
        mgr.add(raw("c1", 3.0), RuleSource::Custom).await.unwrap();
        assert!(mgr.get("c1").await.is_some());
        mgr.delete("c1").await.unwrap();
        assert!(mgr.get("c1").await.is_none());
    }

    #[tokio::test]
    async fn delete_rejects_non_custom_rules() {
        let mgr = RuleManager::new();
        let any_builtin = mgr.stats().await;
        assert!(any_builtin.by_source.builtin > 0);
        let id = "builtin-sql-union-select".to_string();
        let result = mgr.delete(&id).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn add_then_update_reflects_delta() {
        let mgr = RuleManager::empty();
        mgr.add(raw("c2", 3.0), RuleSource::Custom).await.unwrap();
        let delta = RuleDelta {
            score: Some(9.0),
            enabled: Some(false),
            ..Default::default()
        };
        mgr.update("c2", delta).await.unwrap();
        let updated = mgr.get("c2").await.unwrap();
        assert_eq!(updated.score, 9.0);
        assert!(!updated.enabled);
    }

    #[tokio::test]
    async fn update_without_flags_keeps_original_case_sensitivity() {
        let mgr = RuleManager::empty();
        let mut case_sensitive = raw("c3", 3.0);
        case_sensitive.pattern = "Foo".into();
        case_sensitive.flags = "".into();
        mgr.add(case_sensitive, RuleSource::Custom).await.unwrap();
        assert!(!mgr.get("c3").await.unwrap().pattern.is_match("foo"));

        // A delta that only touches `score` must not flip the rule to
        // case-insensitive by falling back to a hardcoded "gi" default.
        let delta = RuleDelta {
            score: Some(4.0),
            ..Default::default()
        };
        mgr.update("c3", delta).await.unwrap();
        let updated = mgr.get("c3").await.unwrap();
        assert_eq!(updated.score, 4.0);
        assert!(!updated.pattern.is_match("foo"));
        assert!(updated.pattern.is_match("Foo"));
    }

    #[tokio::test]
    async fn every_enabled_rule_has_nonnegative_score() {
        let mgr = RuleManager::new();
        for rule in mgr.enabled_rules().await {
            assert!(rule.is_valid());
        }
    }

    struct FakeSource(Vec<RawRule>);

    #[async_trait]
    impl CommunityRuleSource for FakeSource {
        async fn fetch(&self) -> Result<Vec<RawRule>, WafError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn refresh_community_adds_new_ids_leaves_existing_untouched() {
        let mgr = RuleManager::empty();
        mgr.add(raw("com-old", 1.0), RuleSource::Community).await.unwrap();
        let fake = FakeSource(vec![raw("com-old", 9.0), raw("com-new", 2.0)]);
        let added = mgr.refresh_community(&fake).await.unwrap();
        assert_eq!(added, 1);
        // existing id untouched: score stays at the original value, not overwritten
        assert_eq!(mgr.get("com-old").await.unwrap().score, 1.0);
        assert!(mgr.get("com-new").await.is_some());
    }

    #[tokio::test]
    async fn load_file_skips_bad_rules_without_failing_batch() {
        let mgr = RuleManager::empty();
        let json = r#"[
            {"id":"bad","name":"bad","category":"x","pattern":"(unclosed","score":1},
            {"id":"good","name":"good","category":"x","pattern":"ok","score":1}
        ]"#;
        let count = mgr.load_file(json, RuleSource::Imported).await.unwrap();
        assert_eq!(count, 1);
        assert!(mgr.get("good").await.is_some());
    }
}
