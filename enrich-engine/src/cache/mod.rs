//! Cache Store
//!
//! Maps a normalized lookup key to a previously computed result plus expiry
//! metadata. `get` treats absent and expired entries identically (a logical
//! miss) and evicts expired entries lazily on read; there is no background
//! sweep. Stores fail open: a backing-store error is logged and reported as a
//! miss so resolution never blocks on a cache outage.

pub mod sqlite;

pub use sqlite::SqliteCache;

use crate::types::EnrichmentResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use enrich_common::{Clock, SystemClock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// A cached resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub result: EnrichmentResult,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Expiry saturates at the latest representable instant
    pub fn new(key: &str, result: EnrichmentResult, now: DateTime<Utc>, ttl: Duration) -> Self {
        let expires_at = ChronoDuration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            key: key.to_string(),
            result,
            created_at: now,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Keyed result store
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Live entry for `key`, or `None` when absent, expired or unavailable
    async fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Create or overwrite the entry for `key` (last writer wins)
    async fn put(&self, key: &str, result: &EnrichmentResult, ttl: Duration);
}

/// In-process cache used by library callers and tests
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.clone()),
                Some(_) => {}
            }
        }

        // Expired: evict, re-checking under the write lock in case of a concurrent put
        let mut entries = self.entries.write().await;
        if entries.get(key).map(|e| e.is_expired(now)).unwrap_or(false) {
            entries.remove(key);
            tracing::debug!(key, "Evicted expired cache entry");
        }
        None
    }

    async fn put(&self, key: &str, result: &EnrichmentResult, ttl: Duration) {
        let entry = CacheEntry::new(key, result.clone(), self.clock.now(), ttl);
        self.entries.write().await.insert(key.to_string(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enrich_common::ManualClock;

    fn sample_result(key: &str) -> EnrichmentResult {
        EnrichmentResult::unresolved(key, Utc::now())
    }

    #[tokio::test]
    async fn test_get_absent_key_is_miss() {
        let cache = MemoryCache::new();
        assert!(cache.get("acme.com").await.is_none());
    }

    #[tokio::test]
    async fn test_put_then_get_returns_identical_result() {
        let cache = MemoryCache::new();
        let result = sample_result("acme.com");
        cache.put("acme.com", &result, Duration::from_secs(60)).await;

        let entry = cache.get("acme.com").await.unwrap();
        assert_eq!(entry.result, result);
        assert_eq!(entry.key, "acme.com");
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss_and_evicted() {
        let clock = ManualClock::default();
        let cache = MemoryCache::with_clock(Arc::new(clock.clone()));
        cache
            .put("acme.com", &sample_result("acme.com"), Duration::from_secs(3600))
            .await;

        clock.advance(Duration::from_secs(3599));
        assert!(cache.get("acme.com").await.is_some());

        clock.advance(Duration::from_secs(2));
        assert!(cache.get("acme.com").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[test]
    fn test_unrepresentable_ttl_saturates_expiry() {
        let now = Utc::now();
        let entry = CacheEntry::new(
            "acme.com",
            sample_result("acme.com"),
            now,
            Duration::from_secs(10_000_000_000_000),
        );
        assert_eq!(entry.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(!entry.is_expired(now));

        let entry = CacheEntry::new("acme.com", sample_result("acme.com"), now, Duration::MAX);
        assert_eq!(entry.expires_at, DateTime::<Utc>::MAX_UTC);
    }

    #[tokio::test]
    async fn test_put_overwrites_existing_entry() {
        let clock = ManualClock::default();
        let cache = MemoryCache::with_clock(Arc::new(clock.clone()));
        cache
            .put("acme.com", &sample_result("acme.com"), Duration::from_secs(10))
            .await;
        clock.advance(Duration::from_secs(5));
        cache
            .put("acme.com", &sample_result("acme.com"), Duration::from_secs(10))
            .await;

        clock.advance(Duration::from_secs(8));
        assert!(cache.get("acme.com").await.is_some());
        assert_eq!(cache.len().await, 1);
    }
}
