//! # Rate Limiter
//!
//! Sliding-window attempt counter keyed by `action_actor`. Advisory only: it
//! lives in memory, resets on restart, and exists to spare the user (and the
//! backend) pointless round-trips. The backend enforces the real limits.
//!
//! # Developer Note
//! The fetch-evict-check-append sequence for one key runs while holding that
//! key's map entry, so concurrent callers on the same key are serialized and a
//! window never admits more than `max_attempts`.

use alifa_core::Clock;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Calls between sweeps of fully expired windows.
const PRUNE_EVERY: u64 = 256;

/// Key of one rate window, e.g. `comment_42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    pub fn new(action: &str, actor_id: &str) -> Self {
        Self(format!("{action}_{actor_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Recent attempt timestamps (ms) for one key, and the window length they
/// were last checked against.
#[derive(Debug, Default)]
struct RateWindow {
    attempts: Vec<i64>,
    window_ms: i64,
}

impl RateWindow {
    fn evict_expired(&mut self, now: i64, window_ms: i64) {
        self.attempts.retain(|&at| now - at < window_ms);
    }
}

pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    clock: Arc<dyn Clock>,
    calls: AtomicU64,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            clock,
            calls: AtomicU64::new(0),
        }
    }

    /// Records an attempt under `key` and returns whether it is admitted.
    /// Rejected attempts are not recorded.
    pub fn is_allowed(&self, key: &str, max_attempts: u32, window_ms: i64) -> bool {
        if max_attempts == 0 {
            return false;
        }

        // Sweep before taking the entry guard; `retain` locks every shard.
        if self.calls.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune();
        }

        let now = self.clock.now_millis();
        let mut window = self.windows.entry(key.to_string()).or_default();
        window.window_ms = window_ms;
        window.evict_expired(now, window_ms);

        if window.attempts.len() >= max_attempts as usize {
            tracing::debug!(key, max_attempts, window_ms, "rate window full");
            return false;
        }

        window.attempts.push(now);
        true
    }

    /// Attempts currently counted under `key`, after eviction.
    pub fn recorded(&self, key: &str, window_ms: i64) -> usize {
        let now = self.clock.now_millis();
        let count = self
            .windows
            .get_mut(key)
            .map(|mut window| {
                window.evict_expired(now, window_ms);
                window.attempts.len()
            })
            .unwrap_or(0);
        if count == 0 {
            self.windows.remove_if(key, |_, window| window.attempts.is_empty());
        }
        count
    }

    /// Drops every key whose attempts have all expired. Returns how many
    /// keys were dropped.
    pub fn prune(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            let window_ms = window.window_ms;
            window.evict_expired(now, window_ms);
            !window.attempts.is_empty()
        });
        let dropped = before.saturating_sub(self.windows.len());
        if dropped > 0 {
            tracing::debug!(dropped, "pruned expired rate windows");
        }
        dropped
    }

    /// Keys currently holding a window.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("keys", &self.windows.len())
            .finish()
    }
}
