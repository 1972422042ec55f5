use chrono::{DateTime, Duration, Utc};

use crate::config::RateLimitConfig;

/// Fixed-window request counter.
///
/// Rollover is lazy: it happens on the first check made strictly after
/// `window_reset_at`. A check landing exactly on `window_reset_at` still
/// counts against the old window.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    count: u32,
    window_reset_at: DateTime<Utc>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self::starting_at(limit, window, Utc::now())
    }

    pub fn starting_at(limit: u32, window: Duration, now: DateTime<Utc>) -> Self {
        Self {
            limit,
            window,
            count: 0,
            window_reset_at: advance(now, window),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        let window = config.window().unwrap_or(Duration::MAX);
        Self::new(config.requests, window)
    }

    /// Admits the call and counts it, or returns `false` once the window's quota is spent.
    pub fn check_limit(&mut self) -> bool {
        self.check_limit_at(Utc::now())
    }

    pub fn check_limit_at(&mut self, now: DateTime<Utc>) -> bool {
        if now > self.window_reset_at {
            self.count = 0;
            self.window_reset_at = advance(now, self.window);
        }
        if self.count >= self.limit {
            return false;
        }
        self.count += 1;
        true
    }

    pub fn reset(&mut self) {
        self.reset_at(Utc::now());
    }

    pub fn reset_at(&mut self, now: DateTime<Utc>) {
        self.count = 0;
        self.window_reset_at = advance(now, self.window);
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }

    pub fn window_reset_at(&self) -> DateTime<Utc> {
        self.window_reset_at
    }
}

// Saturates at the latest representable instant.
fn advance(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_add_signed(window)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn blocks_after_quota_within_window() {
        let start = t0();
        let mut limiter = RateLimiter::starting_at(3, Duration::milliseconds(1000), start);

        for i in 0..3 {
            assert!(limiter.check_limit_at(start + Duration::milliseconds(i * 10)));
        }
        assert!(!limiter.check_limit_at(start + Duration::milliseconds(500)));
        assert_eq!(limiter.count(), 3);
        assert_eq!(limiter.remaining(), 0);
    }

    #[test]
    fn window_rolls_over_lazily() {
        let start = t0();
        let mut limiter = RateLimiter::starting_at(2, Duration::milliseconds(1000), start);
        assert!(limiter.check_limit_at(start));
        assert!(limiter.check_limit_at(start));
        assert!(!limiter.check_limit_at(start));

        assert!(limiter.check_limit_at(start + Duration::milliseconds(1001)));
        assert_eq!(limiter.count(), 1);
    }

    #[test]
    fn call_at_reset_instant_belongs_to_old_window() {
        let start = t0();
        let mut limiter = RateLimiter::starting_at(1, Duration::milliseconds(1000), start);
        assert!(limiter.check_limit_at(start));

        let boundary = limiter.window_reset_at();
        assert!(!limiter.check_limit_at(boundary));
        assert!(limiter.check_limit_at(boundary + Duration::milliseconds(1)));
    }

    #[test]
    fn reset_restarts_window() {
        let start = t0();
        let mut limiter = RateLimiter::starting_at(1, Duration::milliseconds(60_000), start);
        assert!(limiter.check_limit_at(start));
        assert!(!limiter.check_limit_at(start));

        limiter.reset_at(start);
        assert_eq!(limiter.count(), 0);
        assert!(limiter.check_limit_at(start));
    }

    #[test]
    fn oversized_window_saturates_instead_of_overflowing() {
        let start = t0();
        let mut limiter = RateLimiter::starting_at(1, Duration::MAX, start);
        assert_eq!(limiter.window_reset_at(), DateTime::<Utc>::MAX_UTC);
        assert!(limiter.check_limit_at(start));
        assert!(!limiter.check_limit_at(start + Duration::days(365)));

        limiter.reset_at(start);
        assert_eq!(limiter.count(), 0);

        let huge = RateLimiter::from_config(&RateLimitConfig {
            requests: 5,
            window_ms: u64::MAX,
        });
        assert_eq!(huge.remaining(), 5);
    }
}
