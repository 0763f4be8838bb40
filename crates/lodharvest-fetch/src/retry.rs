//! Retry budget and backoff schedule for resource fetches.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

/// Statuses worth another attempt. Everything else non-2xx is final.
pub const RETRYABLE_STATUSES: [u16; 5] = [500, 502, 503, 504, 429];

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 8,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn exponential(retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            retries,
            initial_delay,
            max_delay,
            multiplier: 2.0,
        }
    }

    pub fn none() -> Self {
        Self {
            retries: 0,
            ..Self::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries + 1
    }

    /// Delay before retry number `attempt` (0-based), capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
    }

    pub fn is_retryable(status: u16) -> bool {
        RETRYABLE_STATUSES.contains(&status)
    }

    /// Server-requested delay from a `Retry-After: <seconds>` header, capped at `max_delay`.
    pub fn retry_after(&self, headers: &HeaderMap) -> Option<Duration> {
        let secs: u64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
        Some(Duration::from_secs(secs).min(self.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn defaults() {
        let p = RetryPolicy::default();
        assert_eq!(p.retries, 8);
        assert_eq!(p.max_attempts(), 9);
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let p = RetryPolicy::exponential(8, Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(p.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(p.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(p.delay_for_attempt(10), Duration::from_secs(1));
    }

    #[test]
    fn retryable_set() {
        for s in [500, 502, 503, 504, 429] {
            assert!(RetryPolicy::is_retryable(s));
        }
        for s in [400, 401, 403, 404, 501] {
            assert!(!RetryPolicy::is_retryable(s));
        }
    }

    #[test]
    fn retry_after_header() {
        let p = RetryPolicy::exponential(1, Duration::from_millis(10), Duration::from_secs(5));
        let mut headers = HeaderMap::new();
        assert_eq!(p.retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("2"));
        assert_eq!(p.retry_after(&headers), Some(Duration::from_secs(2)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("120"));
        assert_eq!(p.retry_after(&headers), Some(Duration::from_secs(5)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(p.retry_after(&headers), None);
    }
}
