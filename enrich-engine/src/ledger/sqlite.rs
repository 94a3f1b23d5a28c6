//! SQLite-backed cost ledger (`cost_log` table)

use super::{CostLedger, LedgerError};
use crate::db::retry_on_lock;
use crate::types::{CostLogEntry, ResolutionStatus, SourceId};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{Pool, Row, Sqlite};

/// Upper bound on time spent waiting out a locked database per append
const MAX_LOCK_WAIT_MS: u64 = 5000;

pub struct SqliteLedger {
    db: Pool<Sqlite>,
}

impl SqliteLedger {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CostLedger for SqliteLedger {
    async fn append(&self, entry: &CostLogEntry) -> Result<(), LedgerError> {
        let sources_used = serde_json::to_string(&entry.sources_used)
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        let sources_used = sources_used.as_str();
        let satisfied_by = entry.satisfied_by.map(|s| s.as_str());
        let db = &self.db;

        retry_on_lock("cost log append", MAX_LOCK_WAIT_MS, || async move {
            sqlx::query(
                r#"
                INSERT INTO cost_log (
                    request_key, cache_hit, sources_used, satisfied_by, estimated_cost,
                    final_confidence, status, attempt_count, timestamp
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&entry.request_key)
            .bind(entry.cache_hit)
            .bind(sources_used)
            .bind(satisfied_by)
            .bind(entry.estimated_cost)
            .bind(i64::from(entry.final_confidence))
            .bind(entry.status.as_str())
            .bind(i64::from(entry.attempt_count))
            .bind(entry.timestamp.timestamp_millis())
            .execute(db)
            .await
            .map_err(enrich_common::Error::from)?;
            Ok(())
        })
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))
    }

    async fn entries_since(&self, since: DateTime<Utc>) -> Result<Vec<CostLogEntry>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT request_key, cache_hit, sources_used, satisfied_by, estimated_cost,
                   final_confidence, status, attempt_count, timestamp
            FROM cost_log
            WHERE timestamp >= ?
            ORDER BY id
            "#,
        )
        .bind(since.timestamp_millis())
        .fetch_all(&self.db)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let sources_json: String = row.get("sources_used");
            let sources_used: Vec<SourceId> = serde_json::from_str(&sources_json)
                .map_err(|e| LedgerError::Storage(format!("corrupt sources_used: {}", e)))?;
            let satisfied_by = row
                .get::<Option<String>, _>("satisfied_by")
                .map(|s| s.parse::<SourceId>())
                .transpose()
                .map_err(LedgerError::Storage)?;
            let status = row
                .get::<String, _>("status")
                .parse::<ResolutionStatus>()
                .map_err(LedgerError::Storage)?;
            let timestamp = Utc
                .timestamp_millis_opt(row.get::<i64, _>("timestamp"))
                .single()
                .ok_or_else(|| LedgerError::Storage("timestamp out of range".to_string()))?;

            entries.push(CostLogEntry {
                request_key: row.get("request_key"),
                cache_hit: row.get("cache_hit"),
                sources_used,
                satisfied_by,
                estimated_cost: row.get("estimated_cost"),
                final_confidence: row.get::<i64, _>("final_confidence").clamp(0, 100) as u8,
                status,
                attempt_count: row.get::<i64, _>("attempt_count").max(0) as u32,
                timestamp,
            });
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    async fn test_pool() -> Pool<Sqlite> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::init_tables(&pool).await.unwrap();
        pool
    }

    fn sample_entry(key: &str, at: DateTime<Utc>) -> CostLogEntry {
        CostLogEntry {
            request_key: key.to_string(),
            cache_hit: false,
            sources_used: vec![SourceId::Fetch, SourceId::DomainRegistration],
            satisfied_by: Some(SourceId::Fetch),
            estimated_cost: 0.0015,
            final_confidence: 72,
            status: ResolutionStatus::Resolved,
            attempt_count: 2,
            timestamp: at,
        }
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let ledger = SqliteLedger::new(test_pool().await);
        let now = Utc::now();
        let entry = sample_entry("acme.com", now);

        ledger.append(&entry).await.unwrap();
        let entries = ledger.entries_since(now - ChronoDuration::seconds(1)).await.unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].request_key, "acme.com");
        assert_eq!(entries[0].sources_used, entry.sources_used);
        assert_eq!(entries[0].satisfied_by, Some(SourceId::Fetch));
        assert_eq!(entries[0].status, ResolutionStatus::Resolved);
        assert_eq!(entries[0].final_confidence, 72);
        assert_eq!(entries[0].attempt_count, 2);
        assert_eq!(entries[0].timestamp.timestamp_millis(), now.timestamp_millis());
    }

    #[tokio::test]
    async fn test_entries_since_filters_by_timestamp() {
        let ledger = SqliteLedger::new(test_pool().await);
        let now = Utc::now();

        ledger
            .append(&sample_entry("old.com", now - ChronoDuration::days(3)))
            .await
            .unwrap();
        ledger.append(&sample_entry("new.com", now)).await.unwrap();

        let entries = ledger.entries_since(now - ChronoDuration::days(1)).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].request_key, "new.com");
    }
}
