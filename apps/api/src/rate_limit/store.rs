//! Window counters behind the rate limiter.
//!
//! Stores are swappable behind `RateLimitStore`: the in-memory store is the
//! default for a single process, `RedisRateLimitStore` shares windows across
//! replicas.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::RateLimitPolicy;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limit store unavailable: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("rate limit store returned an unexpected reply: {0}")]
    UnexpectedReply(String),
}

/// State of one fixed window right after recording a request in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Requests counted in the current window, including this one.
    pub count: u32,
    /// Time until the window closes and the count starts over.
    pub reset_after: Duration,
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Records one request against `key` and returns the resulting window.
    /// A missing or finished window starts a new one of `policy.window`.
    async fn hit(&self, key: &str, policy: &RateLimitPolicy)
        -> Result<WindowSnapshot, RateLimitError>;

    /// Drops finished windows. Stores with native expiry have nothing to do.
    async fn purge_expired(&self) -> usize {
        0
    }

    fn backend(&self) -> &'static str;
}

struct Window {
    count: u32,
    resets_at: Instant,
}

/// Process-local counters. State is lost on restart and not shared between replicas.
#[derive(Default)]
pub struct InMemoryRateLimitStore {
    windows: Mutex<HashMap<String, Window>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Window>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Longest window an `Instant` is asked to represent (about 100 years).
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn window_end(now: Instant, window: Duration) -> Instant {
    now.checked_add(window)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn hit(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
    ) -> Result<WindowSnapshot, RateLimitError> {
        let now = Instant::now();
        let mut windows = self.lock();

        let window = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            resets_at: window_end(now, policy.window),
        });

        if now >= window.resets_at {
            window.count = 0;
            window.resets_at = window_end(now, policy.window);
        }
        window.count = window.count.saturating_add(1);

        Ok(WindowSnapshot {
            count: window.count,
            reset_after: window.resets_at - now,
        })
    }

    async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, w| now < w.resets_at);
        before - windows.len()
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: RateLimitPolicy = RateLimitPolicy::new(3, Duration::from_secs(60));

    #[tokio::test(start_paused = true)]
    async fn test_hits_accumulate_within_window() {
        let store = InMemoryRateLimitStore::new();
        for expected in 1..=5 {
            let snapshot = store.hit("ratelimit:api:1.2.3.4", &POLICY).await.unwrap();
            assert_eq!(snapshot.count, expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_after_counts_down() {
        let store = InMemoryRateLimitStore::new();
        let first = store.hit("k", &POLICY).await.unwrap();
        assert_eq!(first.reset_after, Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(20)).await;
        let second = store.hit("k", &POLICY).await.unwrap();
        assert_eq!(second.reset_after, Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_window_starts_over() {
        let store = InMemoryRateLimitStore::new();
        store.hit("k", &POLICY).await.unwrap();
        store.hit("k", &POLICY).await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        let snapshot = store.hit("k", &POLICY).await.unwrap();
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.reset_after, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_window_does_not_overflow() {
        let policy = RateLimitPolicy::new(3, Duration::from_secs(u64::MAX));
        let store = InMemoryRateLimitStore::new();

        let first = store.hit("k", &policy).await.unwrap();
        let second = store.hit("k", &policy).await.unwrap();
        assert_eq!(second.count, 2);
        assert!(second.reset_after <= first.reset_after);
        assert!(second.reset_after > Duration::from_secs(365 * 24 * 60 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_drops_only_finished_windows() {
        let store = InMemoryRateLimitStore::new();
        store.hit("old", &POLICY).await.unwrap();
        tokio::time::advance(Duration::from_secs(45)).await;
        store.hit("fresh", &POLICY).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.hit("fresh", &POLICY).await.unwrap().count, 2);
    }
}
