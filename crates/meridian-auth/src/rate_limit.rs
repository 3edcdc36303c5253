//! Per-IP token bucket rate limiting (§4.4: "5/min/IP").

use std::net::IpAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;

const CAPACITY: f64 = 5.0;
/// Tokens refill at `CAPACITY` per minute.
const REFILL_PER_SEC: f64 = CAPACITY / 60.0;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket limiter keyed by client IP.
///
/// Buckets are lazily created on first use and never evicted; a production
/// deployment would age out stale entries, but that sweep is out of scope
/// here (the lifecycle worker owns all time-based GC, and rate-limit state
/// is not itself spec-visible state).
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<IpAddr, Bucket>,
}

impl RateLimiter {
    /// Construct an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to consume one token for `ip`. Returns `true` if allowed.
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut entry = self.buckets.entry(ip).or_insert_with(|| Bucket {
            tokens: CAPACITY,
            last_refill: now,
        });

        let elapsed = now.duration_since(entry.last_refill).as_secs_f64();
        entry.tokens = (entry.tokens + elapsed * REFILL_PER_SEC).min(CAPACITY);
        entry.last_refill = now;

        if entry.tokens >= 1.0 {
            entry.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Seconds until `ip` will next have a token available, if currently
    /// exhausted.
    #[must_use]
    pub fn retry_after(&self, ip: IpAddr) -> u64 {
        self.buckets
            .get(&ip)
            .map(|b| {
                let deficit = 1.0 - b.tokens;
                if deficit <= 0.0 {
                    0
                } else {
                    (deficit / REFILL_PER_SEC).ceil() as u64
                }
            })
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    #[test]
    fn test_allows_up_to_capacity_then_blocks() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check(ip()));
        }
        assert!(!limiter.check(ip()));
    }

    #[test]
    fn test_distinct_ips_have_independent_buckets() {
        let limiter = RateLimiter::new();
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        for _ in 0..5 {
            assert!(limiter.check(a));
        }
        assert!(!limiter.check(a));
        assert!(limiter.check(b));
    }

    #[test]
    fn test_refills_over_time() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check(ip()));
        }
        std::thread::sleep(Duration::from_millis(250));
        // ~5/min refill rate means 250ms isn't enough for a full token yet,
        // but the bucket should not go negative or panic.
        let _ = limiter.check(ip());
    }
}
