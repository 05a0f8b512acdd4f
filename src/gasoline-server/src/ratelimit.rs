//! Per-client token-bucket rate limiting.
//!
//! Buckets are keyed by client ID under a single mutex; `""` is the
//! single-client fallback key. Stale buckets are evicted by the cleanup
//! task so idle clients do not accumulate.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::RateLimitConfig;

/// Buckets idle this long are evicted.
const BUCKET_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_update: Instant,
}

/// Externally visible limiter state for `/health`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitState {
    /// Configured calls per minute.
    pub threshold: u32,
    /// Whether any client is currently exhausted.
    pub circuit_open: bool,
    /// Tracked client buckets.
    pub tracked_clients: usize,
}

/// Token-bucket limiter keyed by client ID.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// Create a limiter with the given configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Take one token for `client_id`. Returns the suggested back-off
    /// when the bucket is empty.
    pub fn check(&self, client_id: &str) -> Result<(), Duration> {
        if !self.config.enabled {
            return Ok(());
        }

        let mut buckets = self.buckets.lock().expect("rate limit lock poisoned");
        let now = Instant::now();

        let bucket = buckets
            .entry(client_id.to_string())
            .or_insert_with(|| Bucket {
                tokens: f64::from(self.config.burst_size),
                last_update: now,
            });

        let elapsed = now.duration_since(bucket.last_update).as_secs_f64();
        let tokens_per_second = f64::from(self.config.requests_per_minute) / 60.0;
        bucket.tokens =
            (bucket.tokens + elapsed * tokens_per_second).min(f64::from(self.config.burst_size));
        bucket.last_update = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let wait = (1.0 - bucket.tokens) / tokens_per_second;
            Err(Duration::from_secs_f64(wait.max(0.1)))
        }
    }

    /// Limiter state for health reporting.
    pub fn state(&self) -> RateLimitState {
        let buckets = self.buckets.lock().expect("rate limit lock poisoned");
        RateLimitState {
            threshold: self.config.requests_per_minute,
            circuit_open: buckets.values().any(|b| b.tokens < 1.0),
            tracked_clients: buckets.len(),
        }
    }

    /// Evict buckets idle past the TTL; returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let mut buckets = self.buckets.lock().expect("rate limit lock poisoned");
        let now = Instant::now();
        let before = buckets.len();
        buckets.retain(|_, b| now.duration_since(b.last_update) < BUCKET_TTL);
        before - buckets.len()
    }

    /// Drop one client's bucket on disconnect.
    pub fn remove_client(&self, client_id: &str) {
        self.buckets
            .lock()
            .expect("rate limit lock poisoned")
            .remove(client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_limited() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: true,
            requests_per_minute: 60,
            burst_size: 2,
        });

        assert!(limiter.check("c1").is_ok());
        assert!(limiter.check("c1").is_ok());
        let backoff = limiter.check("c1").unwrap_err();
        assert!(backoff > Duration::ZERO);
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: true,
            requests_per_minute: 60,
            burst_size: 1,
        });

        assert!(limiter.check("c1").is_ok());
        assert!(limiter.check("c1").is_err());
        // A different client has its own bucket.
        assert!(limiter.check("c2").is_ok());
        // The empty key is the single-client fallback.
        assert!(limiter.check("").is_ok());
    }

    #[test]
    fn test_disabled_limiter_always_passes() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: false,
            requests_per_minute: 1,
            burst_size: 1,
        });
        for _ in 0..100 {
            assert!(limiter.check("c1").is_ok());
        }
    }

    #[test]
    fn test_state_reports_exhaustion() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: true,
            requests_per_minute: 60,
            burst_size: 1,
        });
        assert!(!limiter.state().circuit_open);
        let _ = limiter.check("c1");
        let _ = limiter.check("c1");
        assert!(limiter.state().circuit_open);
    }
}
