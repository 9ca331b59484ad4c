//! Two-tier result cache.
//!
//! The fast tier is an in-process LRU with a per-entry TTL. The optional
//! durable tier is a Redis instance shared across processes. Reads go fast
//! then durable (backfilling the fast tier); writes go to both. The durable
//! tier is best-effort: its failures are logged and never surface to callers.

mod memory;
#[cfg(feature = "durable-cache")]
mod durable;

#[cfg(feature = "durable-cache")]
pub use durable::{RedisTier, KEY_PREFIX};
pub use memory::MemoryTier;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ServiceConfig;
use crate::errors::CacheError;

/// Returns a stable hex key for a query and its parameters.
///
/// The key is the SHA-256 of the canonical JSON object `{query, ...params}`
/// with sorted keys, so parameter order does not matter.
pub fn make_cache_key<'a>(
    query: &str,
    params: impl IntoIterator<Item = (&'a str, serde_json::Value)>,
) -> String {
    let mut payload: BTreeMap<&str, serde_json::Value> = params.into_iter().collect();
    payload.insert("query", serde_json::json!(query));

    let json = serde_json::to_string(&payload).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    hex::encode(hasher.finalize())
}

/// One storage tier of the research cache.
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Gets a live entry.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError>;

    /// Stores an entry with the tier's TTL.
    async fn set(&self, key: &str, value: &serde_json::Value) -> Result<(), CacheError>;

    /// Removes an entry.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Removes every entry owned by this tier.
    async fn clear(&self) -> Result<(), CacheError>;

    /// Tier name for logging.
    fn name(&self) -> &'static str;
}

/// Cache statistics as reported by the `cache_stats` tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries in the fast tier.
    pub memory_entries: usize,
    /// Fast-tier capacity.
    pub memory_capacity: usize,
    /// Fast-tier TTL in seconds.
    pub memory_ttl_seconds: u64,
    /// Name of the attached durable tier.
    pub durable_tier: Option<String>,
}

/// The research result cache.
pub struct ResearchCache {
    memory: MemoryTier,
    durable: Option<Arc<dyn CacheTier>>,
}

impl std::fmt::Debug for ResearchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchCache")
            .field("memory", &self.memory)
            .field("durable", &self.durable.as_ref().map(|t| t.name()))
            .finish()
    }
}

impl Default for ResearchCache {
    fn default() -> Self {
        let config = ServiceConfig::default();
        Self::memory_only(config.cache_max_size, config.memory_ttl())
    }
}

impl ResearchCache {
    /// Creates a cache with only the fast tier.
    #[must_use]
    pub fn memory_only(max_size: usize, ttl: Duration) -> Self {
        Self {
            memory: MemoryTier::new(max_size, ttl),
            durable: None,
        }
    }

    /// Attaches a durable tier.
    #[must_use]
    pub fn with_durable(mut self, tier: Arc<dyn CacheTier>) -> Self {
        self.durable = Some(tier);
        self
    }

    /// Builds the cache from service configuration.
    ///
    /// A durable tier that cannot be reached is skipped.
    pub async fn from_config(config: &ServiceConfig) -> Self {
        let cache = Self::memory_only(config.cache_max_size, config.memory_ttl());
        match config.cache_durable_url.as_deref() {
            Some(url) => attach_durable(cache, url, config.durable_ttl()).await,
            None => cache,
        }
    }

    /// Looks up an entry, fast tier first.
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let short = short_key(key);
        if let Some(value) = self.memory.get(key) {
            tracing::debug!(key = short, tier = "memory", "Cache hit");
            return Some(value);
        }

        if let Some(durable) = &self.durable {
            match durable.get(key).await {
                Ok(Some(value)) => {
                    tracing::debug!(key = short, tier = durable.name(), "Cache hit");
                    self.memory.set(key, value.clone());
                    return Some(value);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(key = short, tier = durable.name(), error = %e, "Cache read failed");
                }
            }
        }

        tracing::debug!(key = short, "Cache miss");
        None
    }

    /// Stores an entry in every tier.
    pub async fn set(&self, key: &str, value: serde_json::Value) {
        if let Some(durable) = &self.durable {
            if let Err(e) = durable.set(key, &value).await {
                tracing::warn!(key = short_key(key), tier = durable.name(), error = %e, "Cache write failed");
            }
        }
        self.memory.set(key, value);
    }

    /// Removes an entry from every tier.
    pub async fn delete(&self, key: &str) {
        self.memory.delete(key);
        if let Some(durable) = &self.durable {
            if let Err(e) = durable.delete(key).await {
                tracing::warn!(key = short_key(key), tier = durable.name(), error = %e, "Cache delete failed");
            }
        }
    }

    /// Empties every tier.
    pub async fn clear(&self) {
        self.memory.clear();
        if let Some(durable) = &self.durable {
            if let Err(e) = durable.clear().await {
                tracing::warn!(tier = durable.name(), error = %e, "Cache clear failed");
            }
        }
        tracing::info!("Cache cleared");
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_entries: self.memory.len(),
            memory_capacity: self.memory.capacity(),
            memory_ttl_seconds: self.memory.ttl().as_secs(),
            durable_tier: self.durable.as_ref().map(|t| t.name().to_string()),
        }
    }
}

#[cfg(feature = "durable-cache")]
async fn attach_durable(cache: ResearchCache, url: &str, ttl: Duration) -> ResearchCache {
    match RedisTier::connect(url, ttl).await {
        Ok(tier) => {
            tracing::info!("Durable cache tier connected");
            cache.with_durable(Arc::new(tier))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Durable cache unavailable, running memory-only");
            cache
        }
    }
}

#[cfg(not(feature = "durable-cache"))]
#[allow(clippy::unused_async)]
async fn attach_durable(cache: ResearchCache, _url: &str, _ttl: Duration) -> ResearchCache {
    tracing::warn!("Durable cache URL set but the durable-cache feature is disabled");
    cache
}

fn short_key(key: &str) -> &str {
    key.get(..16).unwrap_or(key)
}
