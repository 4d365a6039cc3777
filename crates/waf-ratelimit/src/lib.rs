//! Rate-Limit / IP-Block module (spec §4.7): sliding-window per-IP
//! counters, an IP block table, and a periodic sweeper.

mod limiter;
mod state;

pub use limiter::{spawn_sweeper, RateLimitVerdict, RateLimiter};
pub use state::{IpBlock, IpRateState};
