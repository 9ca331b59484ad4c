//! Redis-backed durable tier.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use std::future::Future;
use std::time::Duration;

use super::CacheTier;
use crate::errors::CacheError;

/// Namespace for research entries.
pub const KEY_PREFIX: &str = "websift:research:";

/// Upper bound on establishing the connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound on any single command.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on a full SCAN of the namespace.
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Keys removed per DEL when clearing.
const DELETE_BATCH: usize = 500;

/// Durable tier storing JSON strings with a Redis expiry.
#[derive(Clone)]
pub struct RedisTier {
    conn: ConnectionManager,
    ttl: Duration,
}

impl std::fmt::Debug for RedisTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTier")
            .field("connection", &"ConnectionManager")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl RedisTier {
    /// Connects to `url`, failing if the server is not reachable in time.
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)
            .map_err(|e| CacheError::Unavailable(format!("invalid Redis URL: {e}")))?;

        let conn = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout { operation: "connect" })?
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        Ok(Self { conn, ttl })
    }

    /// Full Redis key for a fingerprint.
    #[must_use]
    pub fn namespaced(key: &str) -> String {
        format!("{KEY_PREFIX}{key}")
    }

    /// Glob matching every key in the namespace.
    #[must_use]
    pub fn scan_pattern() -> String {
        format!("{KEY_PREFIX}*")
    }

    /// Collects namespace keys with cursor-based SCAN, never KEYS.
    async fn namespace_keys(&self) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn.clone();
        let scan = async move {
            let mut iter = conn.scan_match::<_, String>(Self::scan_pattern()).await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key?);
            }
            Ok::<_, redis::RedisError>(keys)
        };
        bounded_within(SCAN_TIMEOUT, "scan", scan).await
    }
}

async fn bounded<T, F>(operation: &'static str, command: F) -> Result<T, CacheError>
where
    F: Future<Output = RedisResult<T>>,
{
    bounded_within(COMMAND_TIMEOUT, operation, command).await
}

async fn bounded_within<T, F>(
    limit: Duration,
    operation: &'static str,
    command: F,
) -> Result<T, CacheError>
where
    F: Future<Output = RedisResult<T>>,
{
    match tokio::time::timeout(limit, command).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(CacheError::Backend(e.to_string())),
        Err(_) => Err(CacheError::Timeout { operation }),
    }
}

#[async_trait]
impl CacheTier for RedisTier {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let mut conn = self.conn.clone();
        let stored: Option<String> = bounded("get", conn.get(Self::namespaced(key))).await?;
        stored
            .map(|json| serde_json::from_str(&json).map_err(|e| CacheError::Codec(e.to_string())))
            .transpose()
    }

    async fn set(&self, key: &str, value: &serde_json::Value) -> Result<(), CacheError> {
        let json = serde_json::to_string(value).map_err(|e| CacheError::Codec(e.to_string()))?;
        let mut conn = self.conn.clone();
        bounded(
            "set",
            conn.set_ex::<_, _, ()>(Self::namespaced(key), json, self.ttl.as_secs().max(1)),
        )
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        bounded("delete", conn.del::<_, ()>(Self::namespaced(key))).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let keys = self.namespace_keys().await?;
        if keys.is_empty() {
            return Ok(());
        }
        tracing::debug!(count = keys.len(), "Clearing durable cache entries");
        let mut conn = self.conn.clone();
        for batch in keys.chunks(DELETE_BATCH) {
            bounded("clear", conn.del::<_, ()>(batch.to_vec())).await?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
