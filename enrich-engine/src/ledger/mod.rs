//! Cost/Outcome Ledger
//!
//! Append-only record of which tier satisfied each request and what it cost.
//! Writes go through [`LedgerHandle`], a single writer task fed by an mpsc
//! channel: callers enqueue and move on, so a slow or broken backing store
//! never delays or fails a resolution. Reads (analytics) flush the queue first.

pub mod sqlite;

pub use sqlite::SqliteLedger;

use crate::types::CostLogEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger storage error: {0}")]
    Storage(String),

    #[error("ledger writer is not running")]
    WriterStopped,
}

/// Append-only cost log storage
#[async_trait]
pub trait CostLedger: Send + Sync {
    async fn append(&self, entry: &CostLogEntry) -> Result<(), LedgerError>;

    /// Entries with `timestamp >= since`, oldest first
    async fn entries_since(&self, since: DateTime<Utc>) -> Result<Vec<CostLogEntry>, LedgerError>;
}

/// In-process ledger used by library callers and tests
#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<CostLogEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<CostLogEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl CostLedger for MemoryLedger {
    async fn append(&self, entry: &CostLogEntry) -> Result<(), LedgerError> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }

    async fn entries_since(&self, since: DateTime<Utc>) -> Result<Vec<CostLogEntry>, LedgerError> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .filter(|e| e.timestamp >= since)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Analytics
// ============================================================================

/// Aggregation over a window of ledger entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub since: DateTime<Utc>,
    pub total_requests: usize,
    pub cache_hit_rate: f64,
    pub average_confidence: f64,
    pub estimated_total_cost: f64,
    /// Requests satisfied per tier/source (`none` for unresolved)
    pub by_tier: BTreeMap<String, usize>,
}

impl Analytics {
    pub fn from_entries(since: DateTime<Utc>, entries: &[CostLogEntry]) -> Self {
        let total = entries.len();
        let mut by_tier: BTreeMap<String, usize> = BTreeMap::new();
        for entry in entries {
            let tier = entry.satisfied_by.map(|s| s.as_str()).unwrap_or("none");
            *by_tier.entry(tier.to_string()).or_default() += 1;
        }

        let (cache_hit_rate, average_confidence) = if total == 0 {
            (0.0, 0.0)
        } else {
            let hits = entries.iter().filter(|e| e.cache_hit).count();
            let confidence_sum: f64 = entries.iter().map(|e| f64::from(e.final_confidence)).sum();
            (hits as f64 / total as f64, confidence_sum / total as f64)
        };

        Self {
            since,
            total_requests: total,
            cache_hit_rate,
            average_confidence,
            estimated_total_cost: entries.iter().map(|e| e.estimated_cost).sum(),
            by_tier,
        }
    }
}

// ============================================================================
// Writer
// ============================================================================

enum LedgerCommand {
    Append(CostLogEntry),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget front end to a [`CostLedger`]
///
/// The queue is unbounded: a slow store delays writes, never drops them.
#[derive(Clone)]
pub struct LedgerHandle {
    tx: mpsc::UnboundedSender<LedgerCommand>,
    store: Arc<dyn CostLedger>,
}

impl LedgerHandle {
    /// Start the writer task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<dyn CostLedger>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<LedgerCommand>();
        let writer = store.clone();

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    LedgerCommand::Append(entry) => {
                        if let Err(e) = writer.append(&entry).await {
                            warn!(key = %entry.request_key, error = %e, "Ledger append failed, entry dropped");
                        }
                    }
                    LedgerCommand::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            debug!("Ledger writer stopped");
        });

        Self { tx, store }
    }

    /// Enqueue an entry without waiting
    pub fn record(&self, entry: CostLogEntry) {
        if let Err(mpsc::error::SendError(LedgerCommand::Append(entry))) =
            self.tx.send(LedgerCommand::Append(entry))
        {
            warn!(key = %entry.request_key, "Ledger writer stopped, entry dropped");
        }
    }

    /// Whether the writer task is still accepting entries
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Wait until every entry enqueued before this call has been written
    pub async fn flush(&self) -> Result<(), LedgerError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(LedgerCommand::Flush(ack_tx))
            .map_err(|_| LedgerError::WriterStopped)?;
        ack_rx.await.map_err(|_| LedgerError::WriterStopped)
    }

    pub async fn analytics(&self, since: DateTime<Utc>) -> Result<Analytics, LedgerError> {
        self.flush().await?;
        let entries = self.store.entries_since(since).await?;
        Ok(Analytics::from_entries(since, &entries))
    }
}
