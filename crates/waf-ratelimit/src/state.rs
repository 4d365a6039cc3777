//! Per-IP state kept by the rate limiter and the block table (spec
//! §4.7, §3).

use chrono::{DateTime, Utc};

/// Sliding-window request counter for one IP. The window resets when
/// `now - first_request_ts > window`.
#[derive(Debug, Clone)]
pub struct IpRateState {
    pub count: u32,
    pub first_request_ts: DateTime<Utc>,
    pub violations: u32,
}

impl IpRateState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            first_request_ts: now,
            violations: 0,
        }
    }
}

/// An IP currently serving a block, with the TTL it expires at.
#[derive(Debug, Clone)]
pub struct IpBlock {
    pub blocked_until: DateTime<Utc>,
}
