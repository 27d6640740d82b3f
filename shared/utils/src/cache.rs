//! In-process TTL cache
//!
//! Stores JSON snapshots keyed by call signature (e.g. `mine:7:products=true`).
//! Writes invalidate by key prefix. Every invalidation bumps a generation
//! counter; a value loaded before an invalidation is never stored after it.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::config::CacheConfig;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

#[derive(Debug, Clone)]
pub struct TtlCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    generation: Arc<AtomicU64>,
    enabled: bool,
    default_ttl: Duration,
}

impl TtlCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
            enabled: config.enabled,
            default_ttl: Duration::from_secs(config.default_ttl_seconds),
        }
    }

    pub fn disabled() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
            enabled: false,
            default_ttl: Duration::ZERO,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the cached value when present, fresh and decodable.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.enabled {
            return None;
        }

        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        serde_json::from_value(entry.value.clone()).ok()
    }

    /// Current invalidation generation. Capture it before loading a value
    /// and hand it to [`TtlCache::set_if_current`].
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub async fn set<T: Serialize>(&self, key: impl Into<String>, value: &T, ttl: Duration) {
        self.store(key.into(), value, ttl, None).await;
    }

    /// Stores the value only if no invalidation ran since `generation` was
    /// read. Returns whether it was stored.
    pub async fn set_if_current<T: Serialize>(
        &self,
        key: impl Into<String>,
        value: &T,
        ttl: Duration,
        generation: u64,
    ) -> bool {
        self.store(key.into(), value, ttl, Some(generation)).await
    }

    async fn store<T: Serialize>(&self, key: String, value: &T, ttl: Duration, generation: Option<u64>) -> bool {
        if !self.enabled {
            return false;
        }

        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(error = %error, "Skipping cache write for unserializable value");
                return false;
            }
        };

        let mut entries = self.entries.write().await;
        // compared under the write lock, which invalidation also holds
        if generation.is_some_and(|seen| seen != self.generation()) {
            return false;
        }
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
        true
    }

    /// Drops every entry whose key starts with `prefix`.
    pub async fn invalidate_prefix(&self, prefix: &str) {
        if !self.enabled {
            return;
        }

        let mut entries = self.entries.write().await;
        entries.retain(|key, _| !key.starts_with(prefix));
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_cache() -> TtlCache {
        TtlCache::new(&CacheConfig {
            enabled: true,
            default_ttl_seconds: 300,
            search_ttl_seconds: 60,
        })
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = enabled_cache();
        cache.set("mine:1", &vec![1, 2, 3], cache.default_ttl()).await;

        let hit: Option<Vec<i32>> = cache.get("mine:1").await;
        assert_eq!(hit, Some(vec![1, 2, 3]));
        let miss: Option<Vec<i32>> = cache.get("mine:2").await;
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let cache = enabled_cache();
        cache.set("mine:1", &"stale", Duration::ZERO).await;

        let value: Option<String> = cache.get("mine:1").await;
        assert!(value.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_prefix_invalidation() {
        let cache = enabled_cache();
        let ttl = cache.default_ttl();
        cache.set("mine:1", &1, ttl).await;
        cache.set("mine:statistics", &2, ttl).await;
        cache.set("product:1", &3, ttl).await;

        cache.invalidate_prefix("mine:").await;

        assert!(cache.get::<i32>("mine:1").await.is_none());
        assert!(cache.get::<i32>("mine:statistics").await.is_none());
        assert_eq!(cache.get::<i32>("product:1").await, Some(3));
    }

    #[tokio::test]
    async fn test_load_started_before_invalidation_is_not_stored() {
        let cache = enabled_cache();
        let ttl = cache.default_ttl();
        let seen = cache.generation();

        cache.invalidate_prefix("production:").await;

        assert!(!cache.set_if_current("production:1", &"draft", ttl, seen).await);
        assert!(cache.get::<String>("production:1").await.is_none());

        let seen = cache.generation();
        assert!(cache.set_if_current("production:1", &"active", ttl, seen).await);
        assert_eq!(cache.get::<String>("production:1").await, Some("active".to_string()));
    }

    #[tokio::test]
    async fn test_disabled_cache_never_stores() {
        let cache = TtlCache::disabled();
        cache.set("mine:1", &1, Duration::from_secs(60)).await;
        assert!(cache.get::<i32>("mine:1").await.is_none());
    }
}
