//! Cache port and its Redis and in-memory adapters.
//!
//! Every cached value is recomputable from the index, so callers treat any
//! cache failure as a miss: [`read_json`] and [`write_json`] run under a
//! deadline and swallow errors and timeouts after logging them.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::{CatalogResult, with_timeout};

/// Key/value store with per-entry TTL
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> CatalogResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> CatalogResult<()>;

    async fn delete(&self, key: &str) -> CatalogResult<()>;

    /// Delete every key starting with `prefix`, returning how many were removed
    async fn delete_by_prefix(&self, prefix: &str) -> CatalogResult<u64>;
}

/// Read and decode a JSON value; errors, timeouts and undecodable entries are misses
pub async fn read_json<T, C>(cache: &C, key: &str, deadline: Duration) -> Option<T>
where
    T: DeserializeOwned,
    C: Cache + ?Sized,
{
    match with_timeout(deadline, cache.get(key)).await {
        Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
            Ok(value) => {
                tracing::debug!(cache_key = %key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(cache_key = %key, error = %e, "Discarding undecodable cache entry");
                None
            }
        },
        Ok(None) => {
            tracing::debug!(cache_key = %key, "Cache miss");
            None
        }
        Err(e) => {
            tracing::warn!(cache_key = %key, error = %e, "Cache unavailable, bypassing");
            None
        }
    }
}

/// Encode and store a JSON value; failures and timeouts are logged and ignored
pub async fn write_json<T, C>(
    cache: &C,
    key: &str,
    value: &T,
    ttl: Duration,
    deadline: Duration,
) where
    T: Serialize + ?Sized,
    C: Cache + ?Sized,
{
    let bytes = match serde_json::to_vec(value) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(cache_key = %key, error = %e, "Failed to encode cache entry");
            return;
        }
    };

    if let Err(e) = with_timeout(deadline, cache.set(key, bytes, ttl.as_secs().max(1))).await {
        tracing::warn!(cache_key = %key, error = %e, "Failed to write cache entry");
    }
}

/// Redis-backed [`Cache`]
#[derive(Clone)]
pub struct RedisCache {
    redis: ConnectionManager,
}

impl RedisCache {
    /// Keys scanned per SCAN round trip during prefix deletes
    const SCAN_BATCH: usize = 500;

    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Open a connection manager and verify it with PING
    pub async fn connect(url: &str) -> CatalogResult<Self> {
        tracing::info!("Connecting to Redis at {}", url);

        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;

        let mut conn = manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        tracing::info!("Connected to Redis");
        Ok(Self::new(manager))
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> CatalogResult<Option<Vec<u8>>> {
        let mut conn = self.redis.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> CatalogResult<()> {
        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CatalogResult<()> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> CatalogResult<u64> {
        let mut conn = self.redis.clone();
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(Self::SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let removed: u64 = conn.del(&keys).await?;
                deleted += removed;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!(prefix, deleted, "Deleted cache keys by prefix");
        Ok(deleted)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-memory [`Cache`] honouring TTLs (development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> CatalogResult<Option<Vec<u8>>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: evict lazily
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> CatalogResult<()> {
        let entry = Entry {
            value,
            expires_at: Instant::now() + Duration::from_secs(ttl_seconds),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CatalogResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> CatalogResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }
}
