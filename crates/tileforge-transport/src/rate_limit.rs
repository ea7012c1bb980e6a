//! Per-endpoint token-bucket admission control.
//!
//! Each remote address gets a bucket holding up to `burst` tokens that
//! refills continuously at `per_second`. A datagram costs one token.
//! Rejection logging is throttled per endpoint so a flood cannot turn
//! into a log flood, and idle buckets are swept on a separate cadence so
//! churn of ephemeral source ports cannot grow the table without bound.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Token-bucket settings.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Refill rate in tokens per second. ≤ 0 disables limiting.
    pub per_second: f64,
    /// Bucket capacity. ≤ 0 disables limiting.
    pub burst: f64,
    /// Buckets untouched for this long are purged by [`RateLimiter::sweep`].
    pub idle_window: Duration,
    /// Minimum spacing between rejection log lines for one endpoint.
    pub log_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 60.0,
            burst: 120.0,
            idle_window: Duration::from_secs(60),
            log_interval: Duration::from_secs(5),
        }
    }
}

impl RateLimitConfig {
    /// Whether limiting is active at all.
    pub fn is_enabled(&self) -> bool {
        self.per_second > 0.0 && self.burst > 0.0
    }
}

/// Verdict for one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A token was consumed; process the datagram.
    Admitted,
    /// No token available; drop the datagram.
    Rejected {
        /// `true` when this rejection should be logged (throttled).
        log: bool,
    },
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
    last_log: Option<Instant>,
}

/// Token buckets keyed by remote endpoint.
///
/// Not thread-safe on its own; it lives inside the server's single
/// state lock like the rest of the mutable state.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: HashMap<SocketAddr, Bucket>,
}

impl RateLimiter {
    /// Creates a limiter with no buckets.
    pub fn new(config: RateLimitConfig) -> Self {
        if !config.is_enabled() {
            tracing::info!("rate limiting disabled");
        }
        Self {
            config,
            buckets: HashMap::new(),
        }
    }

    /// Refills `addr`'s bucket up to `now` and tries to take one token.
    ///
    /// A bucket is created full on the first datagram from an address.
    pub fn check(&mut self, addr: SocketAddr, now: Instant) -> Admission {
        if !self.config.is_enabled() {
            return Admission::Admitted;
        }

        let burst = self.config.burst;
        let bucket = self.buckets.entry(addr).or_insert_with(|| Bucket {
            tokens: burst,
            last_refill: now,
            last_seen: now,
            last_log: None,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.config.per_second).min(burst);
        bucket.last_refill = now;
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Admission::Admitted;
        }

        let log = match bucket.last_log {
            Some(at) => now.saturating_duration_since(at) >= self.config.log_interval,
            None => true,
        };
        if log {
            bucket.last_log = Some(now);
        }
        Admission::Rejected { log }
    }

    /// Drops buckets idle longer than the idle window. Returns how many.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let idle = self.config.idle_window;
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) <= idle);
        let purged = before - self.buckets.len();
        if purged > 0 {
            tracing::debug!(purged, remaining = self.buckets.len(), "rate-limit buckets swept");
        }
        purged
    }

    /// Number of tracked endpoints.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Returns `true` when no endpoint is tracked.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// The active configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn limiter(per_second: f64, burst: f64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            per_second,
            burst,
            ..RateLimitConfig::default()
        })
    }

    #[test]
    fn test_check_admits_exactly_burst_then_rejects() {
        let mut rl = limiter(10.0, 5.0);
        let now = Instant::now();
        for i in 0..5 {
            assert_eq!(rl.check(addr(1), now), Admission::Admitted, "packet {i}");
        }
        assert!(matches!(rl.check(addr(1), now), Admission::Rejected { .. }));
    }

    #[test]
    fn test_check_refills_at_configured_rate() {
        let mut rl = limiter(10.0, 5.0);
        let t0 = Instant::now();
        for _ in 0..5 {
            rl.check(addr(1), t0);
        }
        // 100 ms at 10/s buys exactly one token.
        let t1 = t0 + Duration::from_millis(100);
        assert_eq!(rl.check(addr(1), t1), Admission::Admitted);
        assert!(matches!(rl.check(addr(1), t1), Admission::Rejected { .. }));

        // One second later: ten tokens accrue but the bucket caps at five.
        let t2 = t1 + Duration::from_secs(1);
        for _ in 0..5 {
            assert_eq!(rl.check(addr(1), t2), Admission::Admitted);
        }
        assert!(matches!(rl.check(addr(1), t2), Admission::Rejected { .. }));
    }

    #[test]
    fn test_check_endpoints_are_independent() {
        let mut rl = limiter(1.0, 1.0);
        let now = Instant::now();
        assert_eq!(rl.check(addr(1), now), Admission::Admitted);
        assert!(matches!(rl.check(addr(1), now), Admission::Rejected { .. }));
        assert_eq!(rl.check(addr(2), now), Admission::Admitted);
    }

    #[test]
    fn test_check_rejection_logging_is_throttled() {
        let mut rl = RateLimiter::new(RateLimitConfig {
            per_second: 0.001,
            burst: 1.0,
            log_interval: Duration::from_secs(5),
            ..RateLimitConfig::default()
        });
        let t0 = Instant::now();
        rl.check(addr(1), t0);

        assert_eq!(rl.check(addr(1), t0), Admission::Rejected { log: true });
        assert_eq!(
            rl.check(addr(1), t0 + Duration::from_secs(1)),
            Admission::Rejected { log: false }
        );
        assert_eq!(
            rl.check(addr(1), t0 + Duration::from_secs(6)),
            Admission::Rejected { log: true }
        );
    }

    #[test]
    fn test_check_disabled_when_rate_or_burst_not_positive() {
        let now = Instant::now();
        for (rate, burst) in [(0.0, 10.0), (10.0, 0.0), (-1.0, 5.0), (5.0, -1.0)] {
            let mut rl = limiter(rate, burst);
            for _ in 0..1000 {
                assert_eq!(rl.check(addr(1), now), Admission::Admitted);
            }
            assert!(rl.is_empty(), "disabled limiter must not track endpoints");
        }
    }

    #[test]
    fn test_sweep_purges_only_idle_entries() {
        let mut rl = RateLimiter::new(RateLimitConfig {
            idle_window: Duration::from_secs(60),
            ..RateLimitConfig::default()
        });
        let t0 = Instant::now();
        rl.check(addr(1), t0);
        rl.check(addr(2), t0 + Duration::from_secs(50));
        assert_eq!(rl.len(), 2);

        let purged = rl.sweep(t0 + Duration::from_secs(61));
        assert_eq!(purged, 1);
        assert_eq!(rl.len(), 1);
    }

    #[test]
    fn test_sweep_then_check_starts_with_full_bucket() {
        let mut rl = RateLimiter::new(RateLimitConfig {
            per_second: 0.001,
            burst: 2.0,
            idle_window: Duration::from_secs(1),
            ..RateLimitConfig::default()
        });
        let t0 = Instant::now();
        rl.check(addr(1), t0);
        rl.check(addr(1), t0);
        let later = t0 + Duration::from_secs(2);
        rl.sweep(later);
        assert_eq!(rl.check(addr(1), later), Admission::Admitted);
        assert_eq!(rl.check(addr(1), later), Admission::Admitted);
    }
}
