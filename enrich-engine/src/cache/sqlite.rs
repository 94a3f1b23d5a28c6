//! SQLite-backed cache store
//!
//! Results are stored as JSON in `cache_entries`; expiry is compared in unix
//! milliseconds. Every database error is logged and treated as a miss.

use super::{CacheEntry, CacheStore};
use crate::types::EnrichmentResult;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use enrich_common::{Clock, SystemClock};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct SqliteCache {
    db: Pool<Sqlite>,
    clock: Arc<dyn Clock>,
}

impl SqliteCache {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Pool<Sqlite>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    async fn evict(&self, key: &str, now_ms: i64) {
        let outcome = sqlx::query("DELETE FROM cache_entries WHERE key = ? AND expires_at < ?")
            .bind(key)
            .bind(now_ms)
            .execute(&self.db)
            .await;
        match outcome {
            Ok(_) => tracing::debug!(key, "Evicted expired cache entry"),
            Err(e) => warn!(key, error = %e, "Cache eviction failed"),
        }
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

#[async_trait]
impl CacheStore for SqliteCache {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        let row: Option<(String, i64, i64)> = match sqlx::query_as(
            "SELECT result, created_at, expires_at FROM cache_entries WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await
        {
            Ok(row) => row,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        let (payload, created_at, expires_at) = row?;
        let now = self.clock.now();
        if now.timestamp_millis() > expires_at {
            self.evict(key, now.timestamp_millis()).await;
            return None;
        }

        let result: EnrichmentResult = match serde_json::from_str(&payload) {
            Ok(result) => result,
            Err(e) => {
                warn!(key, error = %e, "Cached result is unreadable, treating as miss");
                return None;
            }
        };

        Some(CacheEntry {
            key: key.to_string(),
            result,
            created_at: from_millis(created_at),
            expires_at: from_millis(expires_at),
        })
    }

    async fn put(&self, key: &str, result: &EnrichmentResult, ttl: Duration) {
        let entry = CacheEntry::new(key, result.clone(), self.clock.now(), ttl);
        let payload = match serde_json::to_string(&entry.result) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize result for cache");
                return;
            }
        };

        let outcome = sqlx::query(
            r#"
            INSERT INTO cache_entries (key, result, created_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                result = excluded.result,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(payload)
        .bind(entry.created_at.timestamp_millis())
        .bind(entry.expires_at.timestamp_millis())
        .execute(&self.db)
        .await;

        if let Err(e) = outcome {
            warn!(key, error = %e, "Cache write failed (result still returned to caller)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldData, FieldName, FieldValue, SourceId};
    use enrich_common::ManualClock;

    async fn test_pool() -> Pool<Sqlite> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::init_tables(&pool).await.unwrap();
        pool
    }

    fn resolved_result() -> EnrichmentResult {
        let mut result = EnrichmentResult::unresolved("acme.com", Utc::now());
        result.fields.insert(
            FieldName::Name,
            FieldValue {
                value: Some(FieldData::Text("Acme".to_string())),
                confidence: 85,
                source: Some(SourceId::Fetch),
            },
        );
        result.recompute(70);
        result
    }

    #[tokio::test]
    async fn test_round_trip_is_bit_identical() {
        let cache = SqliteCache::new(test_pool().await);
        let result = resolved_result();

        cache.put("acme.com", &result, Duration::from_secs(60)).await;
        let entry = cache.get("acme.com").await.unwrap();

        assert_eq!(entry.result, result);
    }

    #[tokio::test]
    async fn test_expired_row_is_miss_and_deleted() {
        let pool = test_pool().await;
        let clock = ManualClock::default();
        let cache = SqliteCache::with_clock(pool.clone(), Arc::new(clock.clone()));

        cache.put("acme.com", &resolved_result(), Duration::from_secs(60)).await;
        clock.advance(Duration::from_secs(61));

        assert!(cache.get("acme.com").await.is_none());
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cache_entries")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_missing_table_fails_open() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let cache = SqliteCache::new(pool);

        cache.put("acme.com", &resolved_result(), Duration::from_secs(60)).await;
        assert!(cache.get("acme.com").await.is_none());
    }
}
