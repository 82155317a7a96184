//! Rate limiting for OTP requests
//!
//! Fixed-window counters keyed by caller-chosen strings. The window only
//! advances through the injected clock, so tests can cross window
//! boundaries without sleeping.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::clock::Clock;

/// Counter-with-expiry service bounding actions per key.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Whether the key has already used up `max` hits in its current window.
    async fn too_many_attempts(&self, key: &str, max: u32) -> bool;

    /// Record a hit, opening a fresh window of `ttl_seconds` if none is
    /// active. Returns the count within the window.
    async fn hit(&self, key: &str, ttl_seconds: u64) -> u32;

    /// Seconds until the key's current window resets; 0 when no window is
    /// active.
    async fn available_in(&self, key: &str) -> u64;
}

#[derive(Debug, Clone)]
struct Window {
    count: u32,
    resets_at: DateTime<Utc>,
}

/// In-process fixed-window limiter
#[derive(Clone)]
pub struct FixedWindowLimiter {
    windows: Arc<RwLock<HashMap<String, Window>>>,
    clock: Arc<dyn Clock>,
}

impl FixedWindowLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Drop windows that have already reset (call periodically).
    pub async fn cleanup(&self) {
        let now = self.clock.now();
        let mut windows = self.windows.write().await;
        windows.retain(|_, w| w.resets_at > now);
    }
}

#[async_trait]
impl RateLimiter for FixedWindowLimiter {
    async fn too_many_attempts(&self, key: &str, max: u32) -> bool {
        let now = self.clock.now();
        let windows = self.windows.read().await;
        match windows.get(key) {
            Some(w) if w.resets_at > now => w.count >= max,
            _ => false,
        }
    }

    async fn hit(&self, key: &str, ttl_seconds: u64) -> u32 {
        let now = self.clock.now();
        let mut windows = self.windows.write().await;
        let window = windows.entry(key.to_string()).or_insert_with(|| Window {
            count: 0,
            resets_at: now + Duration::seconds(ttl_seconds as i64),
        });

        if window.resets_at <= now {
            window.count = 0;
            window.resets_at = now + Duration::seconds(ttl_seconds as i64);
        }

        window.count += 1;
        window.count
    }

    async fn available_in(&self, key: &str) -> u64 {
        let now = self.clock.now();
        let windows = self.windows.read().await;
        match windows.get(key) {
            Some(w) if w.resets_at > now => (w.resets_at - now).num_seconds().max(0) as u64,
            _ => 0,
        }
    }
}
