//! The rolling Baseline (spec §4.5): the running statistics the
//! anomaly scorer compares each request against.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use dashmap::DashMap;

const FREQUENCY_WINDOW: Duration = Duration::from_secs(5 * 60);
const RECENT_WINDOW_HISTORY: usize = 500;

struct IpWindow {
    window_start: Instant,
    count: u64,
}

/// Tracks per-IP request frequency in a rolling 5-minute window, path
/// and user-agent frequency ratios, and mean request body size.
///
/// Every counter here is a `DashMap`/atomic so requests on different
/// connections can update the baseline concurrently without a single
/// writer lock (§5: the baseline is the one genuinely hot shared-write
/// structure on the request path).
pub struct Baseline {
    ip_windows: DashMap<String, IpWindow>,
    recent_window_counts: RwLock<VecDeque<u64>>,
    path_counts: DashMap<String, u64>,
    ua_counts: DashMap<String, u64>,
    total_requests: AtomicU64,
    body_size_sum: AtomicU64,
    body_size_count: AtomicU64,
}

impl Baseline {
    pub fn new() -> Self {
        Self {
            ip_windows: DashMap::new(),
            recent_window_counts: RwLock::new(VecDeque::with_capacity(RECENT_WINDOW_HISTORY)),
            path_counts: DashMap::new(),
            ua_counts: DashMap::new(),
            total_requests: AtomicU64::new(0),
            body_size_sum: AtomicU64::new(0),
            body_size_count: AtomicU64::new(0),
        }
    }

    /// Always maintained, even while `learningPhase = Protecting`
    /// (spec §4.5) — returns the request count so far in the current
    /// rolling window for `ip`, rolling the window over if expired.
    pub fn bump_ip_frequency(&self, ip: &str) -> u64 {
        let mut entry = self.ip_windows.entry(ip.to_string()).or_insert_with(|| IpWindow {
            window_start: Instant::now(),
            count: 0,
        });
        if entry.window_start.elapsed() > FREQUENCY_WINDOW {
            if entry.count > 0 {
                let mut history = self.recent_window_counts.write().unwrap();
                if history.len() >= RECENT_WINDOW_HISTORY {
                    history.pop_front();
                }
                history.push_back(entry.count);
            }
            entry.window_start = Instant::now();
            entry.count = 0;
        }
        entry.count += 1;
        entry.count
    }

    /// Mean per-IP-per-window request count across recently completed
    /// windows, used as the frequency-anomaly baseline.
    pub fn mean_requests_per_ip_window(&self) -> f64 {
        let history = self.recent_window_counts.read().unwrap();
        if history.is_empty() {
            return 1.0;
        }
        history.iter().sum::<u64>() as f64 / history.len() as f64
    }

    /// Skipped while `learningPhase = Protecting`, per spec §4.5 — the
    /// caller decides whether to call this.
    pub fn record(&self, path: &str, user_agent: Option<&str>, body_len: usize) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        *self.path_counts.entry(path.to_string()).or_insert(0) += 1;
        if let Some(ua) = user_agent {
            *self.ua_counts.entry(ua.to_string()).or_insert(0) += 1;
        }
        self.body_size_sum.fetch_add(body_len as u64, Ordering::Relaxed);
        self.body_size_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn path_frequency_ratio(&self, path: &str) -> f64 {
        self.frequency_ratio(&self.path_counts, path)
    }

    pub fn user_agent_frequency_ratio(&self, ua: &str) -> f64 {
        self.frequency_ratio(&self.ua_counts, ua)
    }

    fn frequency_ratio(&self, counts: &DashMap<String, u64>, key: &str) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 1.0;
        }
        let seen = counts.get(key).map(|c| *c).unwrap_or(0);
        seen as f64 / total as f64
    }

    pub fn mean_body_size(&self) -> f64 {
        let count = self.body_size_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.body_size_sum.load(Ordering::Relaxed) as f64 / count as f64
    }
}

impl Default for Baseline {
    fn default() -> Self {
        Self::new()
    }
}
