use bytes::Bytes;
use serde::Serialize;

use crate::cache::{CacheStats, MemoryCache, UltraCache, UltraCacheConfig};
use crate::config::CacheSettings;
use crate::models::resume::PublicResume;

/// The process-scoped caches, built once at startup and shared through `AppState`.
pub struct AppCaches {
    /// Public resume documents keyed by slug.
    pub resumes: UltraCache<PublicResume>,
    /// Language-model outputs keyed by task and input fingerprint.
    pub ai: UltraCache<String>,
    /// Rendered PDFs keyed by object-storage key. PDFs are already compressed,
    /// so they skip the gzip layer.
    pub pdfs: MemoryCache<Bytes>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedCacheStats {
    pub name: &'static str,
    #[serde(flatten)]
    pub stats: CacheStats,
}

impl AppCaches {
    pub const NAMES: [&'static str; 3] = ["resumes", "ai", "pdfs"];

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self {
            resumes: UltraCache::new(UltraCacheConfig {
                max_items: settings.resume_max_items,
                max_bytes: settings.resume_max_bytes,
                default_ttl: settings.resume_ttl,
                ..UltraCacheConfig::default()
            }),
            ai: UltraCache::new(UltraCacheConfig {
                max_items: settings.ai_max_items,
                max_bytes: settings.ai_max_bytes,
                default_ttl: settings.ai_ttl,
                ..UltraCacheConfig::default()
            }),
            pdfs: MemoryCache::new(settings.pdf_max_items, settings.pdf_ttl),
        }
    }

    pub fn stats(&self) -> Vec<NamedCacheStats> {
        vec![
            NamedCacheStats {
                name: "resumes",
                stats: self.resumes.stats(),
            },
            NamedCacheStats {
                name: "ai",
                stats: self.ai.stats(),
            },
            NamedCacheStats {
                name: "pdfs",
                stats: self.pdfs.stats(),
            },
        ]
    }

    /// Clears the cache called `name`. Returns false for an unknown name.
    pub fn clear(&self, name: &str) -> bool {
        match name {
            "resumes" => self.resumes.clear(),
            "ai" => self.ai.clear(),
            "pdfs" => self.pdfs.clear(),
            _ => return false,
        }
        true
    }
}
