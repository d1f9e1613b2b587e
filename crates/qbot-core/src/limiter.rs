//! Inbound event rate limiter.
//!
//! A fingerprint (the raw message text) is accepted at most once per cooldown
//! window. This is burst deduplication, not exactly-once delivery: two users
//! sending the same text collide, and arrivals right at the window boundary may
//! race.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

/// Table size after which expired fingerprints are swept on insert.
pub const DEFAULT_SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug)]
pub struct RateLimiter {
    cooldown: Duration,
    sweep_threshold: usize,
    seen: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self::with_sweep_threshold(cooldown, DEFAULT_SWEEP_THRESHOLD)
    }

    pub fn with_sweep_threshold(cooldown: Duration, sweep_threshold: usize) -> Self {
        Self {
            cooldown,
            sweep_threshold: sweep_threshold.max(1),
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Returns `true` when the fingerprint may proceed.
    pub fn allow(&self, fingerprint: &str) -> bool {
        self.allow_at(fingerprint, Instant::now())
    }

    pub fn allow_at(&self, fingerprint: &str, now: Instant) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(last) = seen.get(fingerprint) {
            // Rejections do not extend the window.
            if now.saturating_duration_since(*last) < self.cooldown {
                return false;
            }
        }

        if seen.len() >= self.sweep_threshold && !seen.contains_key(fingerprint) {
            let cooldown = self.cooldown;
            seen.retain(|_, last| now.saturating_duration_since(*last) < cooldown);
        }

        seen.insert(fingerprint.to_string(), now);
        true
    }

    /// Number of fingerprints currently tracked.
    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
