// In-process caches owned by the application bootstrap.
// MemoryCache: count-bounded, TTL, oldest-inserted eviction.
// UltraCache: gzip-compressed payloads, count + byte budget, least-hits eviction.
// Neither sweeps in the background; expiry is checked on access.

pub mod codec;
pub mod memory;
pub mod registry;
pub mod ultra;

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

pub use memory::MemoryCache;
pub use registry::AppCaches;
pub use ultra::{UltraCache, UltraCacheConfig};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache compression failed: {0}")]
    Compression(#[from] std::io::Error),

    #[error("entry of {size} bytes exceeds the cache budget of {budget} bytes")]
    EntryTooLarge { size: usize, budget: usize },
}

/// Point-in-time counters for one cache instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    /// Accounted bytes; `None` for caches that do not track memory.
    pub bytes: Option<usize>,
    pub max_bytes: Option<usize>,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Stand-in expiry for TTLs too large to add to an `Instant` (about 100 years).
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `now + ttl`, clamped to a far-future instant instead of overflowing.
pub(crate) fn expiry_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}
