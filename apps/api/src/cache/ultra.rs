//! UltraCache: compressed cache bounded by item count and accounted bytes.
//!
//! Values are stored as gzip-compressed JSON (see [`codec`]). An entry costs
//! `payload.len() + key.len()` bytes against the budget. When an insert would
//! break either bound, expired entries go first, then the entry with the fewest
//! hits (oldest insertion on ties). This is frequency-based, not LRU: a fresh
//! entry that has never been read is the first to go.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use flate2::Compression;
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::cache::{codec, expiry_after, CacheError, CacheStats};

#[derive(Debug, Clone)]
pub struct UltraCacheConfig {
    pub max_items: usize,
    pub max_bytes: usize,
    pub default_ttl: Duration,
    pub compression: Compression,
}

impl Default for UltraCacheConfig {
    fn default() -> Self {
        Self {
            max_items: 1000,
            max_bytes: 16 * 1024 * 1024,
            default_ttl: Duration::from_secs(300),
            compression: Compression::default(),
        }
    }
}

struct Entry {
    payload: Vec<u8>,
    size: usize,
    expires_at: Instant,
    hits: u64,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    total_bytes: usize,
    next_seq: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Inner {
    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.total_bytes -= entry.size;
        Some(entry)
    }

    fn purge_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| now >= e.expires_at)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            self.remove(&key);
        }
    }

    /// Key of the entry with the fewest hits; oldest insertion breaks ties.
    fn coldest_key(&self) -> Option<String> {
        self.entries
            .iter()
            .min_by_key(|(_, e)| (e.hits, e.seq))
            .map(|(k, _)| k.clone())
    }
}

pub struct UltraCache<V> {
    inner: Mutex<Inner>,
    config: UltraCacheConfig,
    _value: PhantomData<fn() -> V>,
}

impl<V: Serialize + DeserializeOwned> UltraCache<V> {
    pub fn new(config: UltraCacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            config,
            _value: PhantomData,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the decoded value and records a hit. Decoding runs outside the lock.
    pub fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        let now = Instant::now();
        let payload = {
            let mut inner = self.lock();
            let expired = match inner.entries.get(key) {
                None => {
                    inner.misses += 1;
                    return Ok(None);
                }
                Some(entry) => now >= entry.expires_at,
            };

            if expired {
                inner.remove(key);
                inner.misses += 1;
                return Ok(None);
            }

            inner.hits += 1;
            match inner.entries.get_mut(key) {
                Some(entry) => {
                    entry.hits += 1;
                    entry.payload.clone()
                }
                None => return Ok(None),
            }
        };

        codec::decode(&payload).map(Some)
    }

    pub fn set(&self, key: impl Into<String>, value: &V) -> Result<(), CacheError> {
        self.set_with_ttl(key, value, self.config.default_ttl)
    }

    pub fn set_with_ttl(
        &self,
        key: impl Into<String>,
        value: &V,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let key = key.into();
        let payload = codec::encode(value, self.config.compression)?;
        let size = payload.len() + key.len();

        if size > self.config.max_bytes {
            return Err(CacheError::EntryTooLarge {
                size,
                budget: self.config.max_bytes,
            });
        }
        if self.config.max_items == 0 {
            return Ok(());
        }

        let now = Instant::now();
        let mut inner = self.lock();
        inner.remove(&key);

        if self.over_budget(&inner, size) {
            inner.purge_expired(now);
        }
        while self.over_budget(&inner, size) {
            let Some(victim) = inner.coldest_key() else {
                break;
            };
            if let Some(evicted) = inner.remove(&victim) {
                inner.evictions += 1;
                debug!(
                    key = %victim,
                    hits = evicted.hits,
                    bytes = evicted.size,
                    "ultra cache evicted coldest entry"
                );
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.total_bytes += size;
        inner.entries.insert(
            key,
            Entry {
                payload,
                size,
                expires_at: expiry_after(now, ttl),
                hits: 0,
                seq,
            },
        );
        Ok(())
    }

    fn over_budget(&self, inner: &Inner, incoming: usize) -> bool {
        inner.entries.len() >= self.config.max_items
            || inner.total_bytes + incoming > self.config.max_bytes
    }

    #[allow(dead_code)]
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut inner = self.lock();
        let expired = match inner.entries.get(key) {
            None => return false,
            Some(entry) => now >= entry.expires_at,
        };
        if expired {
            inner.remove(key);
        }
        !expired
    }

    #[allow(dead_code)]
    pub fn delete(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.total_bytes = 0;
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Accounted bytes currently held.
    #[allow(dead_code)]
    pub fn memory_usage(&self) -> usize {
        self.lock().total_bytes
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            entries: inner.entries.len(),
            max_entries: self.config.max_items,
            bytes: Some(inner.total_bytes),
            max_bytes: Some(self.config.max_bytes),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Resume {
        slug: String,
        title: String,
    }

    fn resume(slug: &str) -> Resume {
        Resume {
            slug: slug.to_string(),
            title: format!("{slug}, Senior Engineer"),
        }
    }

    fn cache(max_items: usize, max_bytes: usize) -> UltraCache<Resume> {
        UltraCache::new(UltraCacheConfig {
            max_items,
            max_bytes,
            default_ttl: Duration::from_secs(60),
            compression: Compression::default(),
        })
    }

    /// Cost of one entry in bytes, measured through a scratch cache.
    fn entry_cost(key: &str, value: &Resume) -> usize {
        let probe = cache(1, usize::MAX);
        probe.set(key, value).unwrap();
        probe.memory_usage()
    }

    #[test]
    fn test_get_returns_stored_value() {
        let cache = cache(10, 64 * 1024);
        cache.set("ada", &resume("ada")).unwrap();
        assert_eq!(cache.get("ada").unwrap(), Some(resume("ada")));
        assert_eq!(cache.get("grace").unwrap(), None);
    }

    #[test]
    fn test_item_cap_evicts_least_hit_entry() {
        let cache = cache(2, 64 * 1024);
        cache.set("a", &resume("a")).unwrap();
        cache.set("b", &resume("b")).unwrap();
        cache.get("a").unwrap();

        cache.set("c", &resume("c")).unwrap();

        assert!(cache.has("a"), "read entry survives");
        assert!(!cache.has("b"), "never-read entry is evicted");
        assert!(cache.has("c"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_hit_ties_evict_oldest_insertion() {
        let cache = cache(3, 64 * 1024);
        cache.set("a", &resume("a")).unwrap();
        cache.set("b", &resume("b")).unwrap();
        cache.set("c", &resume("c")).unwrap();
        cache.set("d", &resume("d")).unwrap();

        assert!(!cache.has("a"));
        assert!(cache.has("b"));
        assert!(cache.has("d"));
    }

    #[test]
    fn test_byte_budget_is_never_exceeded() {
        let cost = entry_cost("key-00", &resume("key-00"));
        let budget = cost * 3 + cost / 2;
        let cache = cache(100, budget);

        for i in 0..40 {
            let key = format!("key-{i:02}");
            cache.set(&key, &resume(&key)).unwrap();
            if i % 3 == 0 {
                cache.get(&key).unwrap();
            }
            assert!(
                cache.memory_usage() <= budget,
                "{} bytes held against a budget of {budget}",
                cache.memory_usage()
            );
        }
        assert!(cache.len() <= 3);
        assert!(cache.has("key-39"));
    }

    #[test]
    fn test_oversized_entry_is_rejected_and_cache_untouched() {
        let cache = cache(10, 64);
        let big = Resume {
            slug: "big".to_string(),
            title: (0..400).map(|i| format!("{i:x}")).collect(),
        };

        let result = cache.set("big", &big);
        assert!(matches!(result, Err(CacheError::EntryTooLarge { budget: 64, .. })));
        assert!(cache.is_empty());
        assert_eq!(cache.memory_usage(), 0);
    }

    #[test]
    fn test_overwrite_replaces_accounting() {
        let cache = cache(10, 64 * 1024);
        cache.set("a", &resume("a")).unwrap();
        let once = cache.memory_usage();
        cache.set("a", &resume("a")).unwrap();
        assert_eq!(cache.memory_usage(), once);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = cache(10, 64 * 1024);
        cache
            .set_with_ttl("a", &resume("a"), Duration::from_millis(500))
            .unwrap();

        tokio::time::advance(Duration::from_millis(499)).await;
        assert!(cache.get("a").unwrap().is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("a").unwrap(), None);
        assert_eq!(cache.memory_usage(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_reclaimed_before_hot_ones() {
        let cache = cache(2, 64 * 1024);
        cache
            .set_with_ttl("stale", &resume("stale"), Duration::from_secs(1))
            .unwrap();
        cache.set("hot", &resume("hot")).unwrap();
        cache.get("stale").unwrap();
        cache.get("stale").unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        cache.set("new", &resume("new")).unwrap();

        assert!(cache.has("hot"));
        assert!(cache.has("new"));
        assert!(!cache.has("stale"));
    }

    #[test]
    fn test_delete_and_clear_release_bytes() {
        let cache = cache(10, 64 * 1024);
        cache.set("a", &resume("a")).unwrap();
        cache.set("b", &resume("b")).unwrap();

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.memory_usage(), entry_cost("b", &resume("b")));

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.memory_usage(), 0);
    }

    #[test]
    fn test_stats_report_budget() {
        let cache = cache(10, 4096);
        cache.set("a", &resume("a")).unwrap();
        cache.get("a").unwrap();
        cache.get("zzz").unwrap();

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.max_bytes, Some(4096));
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!(stats.bytes.unwrap() > 0);
    }
}
