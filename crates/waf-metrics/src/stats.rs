//! The Stats Collector (spec §4.8): monotonically increasing counters
//! plus bounded maps keyed by hour and day (ISO hour / day floor).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use waf_common::model::AnalysisRecord;

/// Matches the action an analyzed request ultimately took — used as
/// the `recordThreat` discriminant (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreatAction {
    Learning,
    DryRun,
    Blocked,
}

impl ThreatAction {
    fn label(self) -> &'static str {
        match self {
            ThreatAction::Learning => "learning",
            ThreatAction::DryRun => "dry-run",
            ThreatAction::Blocked => "blocked",
        }
    }
}

const MAX_BUCKETS: usize = 24 * 31;

#[derive(Default)]
struct Buckets {
    by_hour: HashMap<String, u64>,
    by_day: HashMap<String, u64>,
}

impl Buckets {
    fn bump(&mut self, now: DateTime<Utc>) {
        let hour_key = now.format("%Y-%m-%dT%H").to_string();
        let day_key = now.format("%Y-%m-%d").to_string();
        *self.by_hour.entry(hour_key).or_insert(0) += 1;
        *self.by_day.entry(day_key).or_insert(0) += 1;
        evict_oldest(&mut self.by_hour);
        evict_oldest(&mut self.by_day);
    }
}

fn evict_oldest(map: &mut HashMap<String, u64>) {
    if map.len() > MAX_BUCKETS {
        if let Some(oldest) = map.keys().min().cloned() {
            map.remove(&oldest);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub total_threats: u64,
    pub total_blocked: u64,
    pub requests_by_hour: HashMap<String, u64>,
    pub threats_by_module: HashMap<String, u64>,
    pub threats_by_type: HashMap<String, u64>,
    pub top_ips: Vec<(String, u64)>,
    pub block_rate: f64,
}

pub struct StatsCollector {
    total_requests: AtomicU64,
    total_threats: AtomicU64,
    total_blocked: AtomicU64,
    request_buckets: RwLock<Buckets>,
    threats_by_module: RwLock<HashMap<String, u64>>,
    threats_by_type: RwLock<HashMap<String, u64>>,
    threats_by_ip: RwLock<HashMap<String, u64>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_threats: AtomicU64::new(0),
            total_blocked: AtomicU64::new(0),
            request_buckets: RwLock::new(Buckets::default()),
            threats_by_module: RwLock::new(HashMap::new()),
            threats_by_type: RwLock::new(HashMap::new()),
            threats_by_ip: RwLock::new(HashMap::new()),
        }
    }

    pub fn record_request(&self, now: DateTime<Utc>) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.request_buckets.write().unwrap().bump(now);
    }

    /// Updates threats, per-module, per-type, per-IP counters for one
    /// analyzed request. `action` discriminates learning / dry-run /
    /// blocked outcomes per spec §4.8.
    pub fn record_threat(&self, record: &AnalysisRecord, action: ThreatAction) {
        if record.threats.is_empty() {
            return;
        }
        self.total_threats
            .fetch_add(record.threats.len() as u64, Ordering::Relaxed);
        if action == ThreatAction::Blocked {
            self.total_blocked.fetch_add(1, Ordering::Relaxed);
        }

        let mut by_module = self.threats_by_module.write().unwrap();
        for module in &record.modules_touched {
            *by_module.entry(module.clone()).or_insert(0) += 1;
        }
        drop(by_module);

        let mut by_type = self.threats_by_type.write().unwrap();
        for threat in &record.threats {
            *by_type.entry(threat.threat_type.clone()).or_insert(0) += 1;
        }
        drop(by_type);

        *self
            .threats_by_ip
            .write()
            .unwrap()
            .entry(record.ip.clone())
            .or_insert(0) += 1;

        tracing::debug!(action = action.label(), ip = %record.ip, "stats recorded threat");
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_threats = self.total_threats.load(Ordering::Relaxed);
        let total_blocked = self.total_blocked.load(Ordering::Relaxed);

        let mut top_ips: Vec<(String, u64)> = self
            .threats_by_ip
            .read()
            .unwrap()
            .iter()
            .map(|(ip, count)| (ip.clone(), *count))
            .collect();
        top_ips.sort_by(|a, b| b.1.cmp(&a.1));
        top_ips.truncate(10);

        let block_rate = if total_requests == 0 {
            0.0
        } else {
            total_blocked as f64 / total_requests as f64
        };

        StatsSnapshot {
            total_requests,
            total_threats,
            total_blocked,
            requests_by_hour: self.request_buckets.read().unwrap().by_hour.clone(),
            threats_by_module: self.threats_by_module.read().unwrap().clone(),
            threats_by_type: self.threats_by_type.read().unwrap().clone(),
            top_ips,
            block_rate,
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}
