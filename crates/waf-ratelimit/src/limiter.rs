//! The Rate-Limit / IP-Block module (spec §4.7).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use waf_common::config::{IpBlockingConfig, RateLimitConfig};
use waf_common::model::Threat;

use crate::state::{IpBlock, IpRateState};

const RATE_LIMIT_SCORE: f64 = 5.0;
const IP_BLOCKED_SCORE: f64 = 10.0;
const SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(60);

#[derive(Debug, Clone)]
pub enum RateLimitVerdict {
    Allowed,
    RateLimited(Threat),
    IpBlocked(Threat),
}

/// DashMap-sharded rate/block state, so concurrent requests from
/// different IPs never contend on a single lock.
///
/// **Invariant:** an IP is never simultaneously present in both
/// `rate_table` and `block_table` — `check` always removes from one
/// before inserting into the other.
pub struct RateLimiter {
    rate_table: DashMap<String, IpRateState>,
    block_table: DashMap<String, IpBlock>,
    rate_config: RateLimitConfig,
    blocking_config: IpBlockingConfig,
}

impl RateLimiter {
    pub fn new(rate_config: RateLimitConfig, blocking_config: IpBlockingConfig) -> Self {
        Self {
            rate_table: DashMap::new(),
            block_table: DashMap::new(),
            rate_config,
            blocking_config,
        }
    }

    pub fn check(&self, ip: &str, now: DateTime<Utc>) -> RateLimitVerdict {
        if !self.rate_config.enabled {
            return RateLimitVerdict::Allowed;
        }

        if self.blocking_config.enabled {
            if let Some(block) = self.block_table.get(ip) {
                if block.blocked_until > now {
                    return RateLimitVerdict::IpBlocked(Threat::new(
                        "ip-blocked",
                        "ip-block-table",
                        "IP is currently blocked for repeated rate-limit violations",
                        IP_BLOCKED_SCORE,
                        ip,
                    ));
                }
            }
            // Expired block: fall through and drop it so the entry
            // doesn't linger until the next sweep.
            self.block_table.remove_if(ip, |_, b| b.blocked_until <= now);
        }

        let window = ChronoDuration::milliseconds(self.rate_config.window_ms as i64);
        let mut entry = self
            .rate_table
            .entry(ip.to_string())
            .or_insert_with(|| IpRateState::new(now));

        if now.signed_duration_since(entry.first_request_ts) > window {
            entry.first_request_ts = now;
            entry.count = 0;
        }
        entry.count += 1;

        if entry.count > self.rate_config.max {
            entry.violations += 1;
            let violations = entry.violations;

            if self.blocking_config.enabled && violations >= self.blocking_config.max_violations {
                let blocked_until =
                    now + ChronoDuration::milliseconds(self.blocking_config.block_duration_ms as i64);
                drop(entry);
                self.rate_table.remove(ip);
                self.block_table.insert(ip.to_string(), IpBlock { blocked_until });
            }

            return RateLimitVerdict::RateLimited(Threat::new(
                "rate-limit",
                "rate-limit-window",
                "Request rate exceeded the configured window limit",
                RATE_LIMIT_SCORE,
                ip,
            ));
        }

        RateLimitVerdict::Allowed
    }

    /// Current count of actively blocked IPs, for the `waf_blocked_ips`
    /// gauge (spec §6). Cheap `DashMap::len`, safe to sample per request.
    pub fn blocked_ip_count(&self) -> usize {
        self.block_table.len()
    }

    fn sweep(&self, now: DateTime<Utc>) {
        let window = ChronoDuration::milliseconds(self.rate_config.window_ms as i64);
        self.rate_table
            .retain(|_, state| now.signed_duration_since(state.first_request_ts) <= window * 4);
        self.block_table.retain(|_, block| block.blocked_until > now);
    }
}

/// Spawns the periodic sweeper task (spec §4.7: "a periodic sweeper
/// (>= once/minute) evicts expired windows and expired blocks").
///
/// Uses a plain `Arc<AtomicBool>` shutdown flag rather than a
/// cancellation-token crate, matching the rest of the workspace's
/// lightest-weight-primitive-that-fits style.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>) -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handle = shutdown.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            if shutdown_handle.load(Ordering::Relaxed) {
                break;
            }
            limiter.sweep(Utc::now());
        }
    });
    shutdown
}
