//! Per-username login attempt limiter.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

/// Fixed-window counter of login attempts keyed by submitted username.
pub struct LoginThrottle {
    limit: u32,
    attempts: Mutex<HashMap<String, (Instant, u32)>>,
}

impl LoginThrottle {
    pub fn new(limit_per_minute: u32) -> Self {
        Self {
            limit: limit_per_minute,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Record an attempt; false when the username is over its limit.
    pub fn check(&self, username: &str) -> bool {
        self.check_at(username, Instant::now())
    }

    fn check_at(&self, username: &str, now: Instant) -> bool {
        let mut attempts = match self.attempts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Keep the map from growing without bound.
        attempts.retain(|_, (start, _)| now.duration_since(*start) < WINDOW);

        let entry = attempts
            .entry(username.to_string())
            .or_insert((now, 0));
        entry.1 += 1;
        entry.1 <= self.limit
    }
}
