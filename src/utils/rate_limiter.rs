// src/utils/rate_limiter.rs
// Per-user sliding-window rate limiting over message submissions

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Per-user sliding window: on each submission, timestamps older than
/// `now - window` are dropped; if the remainder has reached the limit the
/// submission is denied, otherwise `now` is appended. Denial never
/// terminates the session.
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    table: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true if the submission is allowed and records it.
    pub fn try_acquire(&self, user_id: &str) -> bool {
        self.try_acquire_at(user_id, Instant::now())
    }

    fn try_acquire_at(&self, user_id: &str, now: Instant) -> bool {
        let mut table = self.table.lock();
        let entries = table.entry(user_id.to_string()).or_default();

        while let Some(front) = entries.front() {
            if now.duration_since(*front) >= self.window {
                entries.pop_front();
            } else {
                break;
            }
        }

        if entries.len() >= self.limit {
            return false;
        }

        entries.push_back(now);
        true
    }

    /// Forget all recorded submissions. Integration suites call this between
    /// scenarios.
    pub fn reset(&self) {
        self.table.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_denies() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60));
        for _ in 0..10 {
            assert!(limiter.try_acquire("u1"));
        }
        assert!(!limiter.try_acquire("u1"));
    }

    #[test]
    fn users_are_isolated() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.try_acquire("u1"));
        assert!(!limiter.try_acquire("u1"));
        assert!(limiter.try_acquire("u2"));
    }

    #[test]
    fn window_expiry_frees_slots() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.try_acquire_at("u1", start));
        assert!(limiter.try_acquire_at("u1", start));
        assert!(!limiter.try_acquire_at("u1", start + Duration::from_secs(30)));
        // First two slots fall out of the window.
        assert!(limiter.try_acquire_at("u1", start + Duration::from_secs(61)));
    }

    #[test]
    fn reset_clears_all_users() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.try_acquire("u1"));
        limiter.reset();
        assert!(limiter.try_acquire("u1"));
    }
}
