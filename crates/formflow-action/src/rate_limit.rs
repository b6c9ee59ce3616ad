//! Submission throttling.
//!
//! The pipeline asks a [`RateLimiter`] once per submission, before any action
//! runs. Check-and-record is a single call so implementations can make it
//! atomic.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use formflow_core::config::{RateLimitBy, RateLimitConfig};
use formflow_core::{RequestContext, Submission};

/// Message shown to the submitter when throttled.
pub const TOO_MANY_SUBMISSIONS: &str = "Too many submissions. Please try again later.";

/// Counter store for submission attempts.
pub trait RateLimiter: Send + Sync {
    /// Record an attempt for `key` unless `max_attempts` were already recorded
    /// within the current window. Returns `false` (and records nothing) when
    /// the limit is reached.
    fn attempt(&self, key: &str, max_attempts: u32, decay: Duration) -> bool;

    /// Forget all attempts for `key`.
    fn clear(&self, key: &str);
}

#[derive(Debug, Clone, Copy)]
struct Window {
    hits: u32,
    /// `None` when the decay is too long to represent; the window never resets.
    expires_at: Option<Instant>,
}

impl Window {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Process-local fixed-window rate limiter.
#[derive(Debug, Default)]
pub struct InMemoryRateLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn attempt_at(&self, key: &str, max_attempts: u32, decay: Duration, now: Instant) -> bool {
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Drop expired windows before the lookup.
        windows.retain(|_, window| !window.is_expired(now));

        let window = windows.entry(key.to_string()).or_insert(Window {
            hits: 0,
            expires_at: now.checked_add(decay),
        });
        if window.hits >= max_attempts {
            return false;
        }
        window.hits += 1;
        true
    }
}

impl RateLimiter for InMemoryRateLimiter {
    fn attempt(&self, key: &str, max_attempts: u32, decay: Duration) -> bool {
        self.attempt_at(key, max_attempts, decay, Instant::now())
    }

    fn clear(&self, key: &str) {
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        windows.remove(key);
    }
}

/// Build the limiter key: `form:<handle>:<by>:<value>`.
pub fn rate_limit_key(
    form_handle: &str,
    config: &RateLimitConfig,
    submission: &Submission,
    request: &RequestContext,
) -> String {
    let value = match config.by {
        RateLimitBy::Ip => request.ip.as_deref().unwrap_or("unknown").to_string(),
        RateLimitBy::Email => submission
            .get_str("email")
            .map(|e| e.trim().to_lowercase())
            .unwrap_or_else(|| "unknown".to_string()),
        RateLimitBy::Session => request.session_id.as_deref().unwrap_or("unknown").to_string(),
    };
    format!("form:{}:{}:{}", form_handle, config.by, value)
}
