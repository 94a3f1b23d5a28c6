//! Database access for enrich-engine
//!
//! One SQLite file (`enrich.db` in the root folder) holds the persistent
//! cache and the cost ledger.

pub mod retry;

pub use retry::retry_on_lock;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create cache_entries and cost_log if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_entries (
            key TEXT PRIMARY KEY,
            result TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cost_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_key TEXT NOT NULL,
            cache_hit INTEGER NOT NULL,
            sources_used TEXT NOT NULL,
            satisfied_by TEXT,
            estimated_cost REAL NOT NULL,
            final_confidence INTEGER NOT NULL,
            status TEXT NOT NULL,
            attempt_count INTEGER NOT NULL,
            timestamp INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cost_log_timestamp ON cost_log(timestamp)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (cache_entries, cost_log)");

    Ok(())
}
