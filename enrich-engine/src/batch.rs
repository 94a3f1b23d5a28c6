//! Batch Coordinator
//!
//! Resolves many identifiers through one orchestrator with a bounded worker
//! pool (`buffer_unordered(concurrency)`). Per-host spacing is the
//! orchestrator's shared host throttle, so it holds regardless of the pool
//! size. Cancellation is cooperative and checked at dispatch: resolutions
//! already in flight finish, nothing new starts.

use crate::orchestrator::Orchestrator;
use crate::types::EnrichmentResult;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Per-identifier outcome, reported in input order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchItem {
    Completed { result: EnrichmentResult },
    Rejected { identifier: String, error: String },
    /// Cancelled before a worker picked it up
    NotStarted { identifier: String },
}

impl BatchItem {
    pub fn result(&self) -> Option<&EnrichmentResult> {
        match self {
            Self::Completed { result } => Some(result),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
    pub completed: usize,
    pub not_started: usize,
    pub elapsed_ms: u64,
}

impl BatchReport {
    /// Results of completed items, in input order
    pub fn results(&self) -> Vec<&EnrichmentResult> {
        self.items.iter().filter_map(BatchItem::result).collect()
    }
}

#[derive(Clone)]
pub struct BatchCoordinator {
    orchestrator: Arc<Orchestrator>,
}

impl BatchCoordinator {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Resolve `identifiers` with at most `concurrency` resolutions in flight
    pub async fn resolve_batch(
        &self,
        identifiers: Vec<String>,
        concurrency: usize,
        cancel_token: CancellationToken,
    ) -> BatchReport {
        let started = std::time::Instant::now();
        let total = identifiers.len();
        let concurrency = concurrency.max(1);
        let completed = Arc::new(AtomicUsize::new(0));

        info!(total, concurrency, "Batch started");

        let mut indexed: Vec<(usize, BatchItem)> = stream::iter(identifiers.into_iter().enumerate())
            .map(|(index, identifier)| {
                let orchestrator = self.orchestrator.clone();
                let cancel_token = cancel_token.clone();
                let completed = completed.clone();

                async move {
                    if cancel_token.is_cancelled() {
                        return (index, BatchItem::NotStarted { identifier });
                    }

                    debug!(index, identifier = %identifier, "Worker picked up identifier");
                    let item = match orchestrator.resolve(&identifier).await {
                        Ok(result) => BatchItem::Completed { result },
                        Err(e) => BatchItem::Rejected {
                            identifier,
                            error: e.to_string(),
                        },
                    };

                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % 10 == 0 || done == total {
                        info!(progress = format!("{}/{}", done, total), "Batch progress");
                    }
                    (index, item)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        indexed.sort_by_key(|(index, _)| *index);
        let items: Vec<BatchItem> = indexed.into_iter().map(|(_, item)| item).collect();

        let not_started = items
            .iter()
            .filter(|item| matches!(item, BatchItem::NotStarted { .. }))
            .count();
        let report = BatchReport {
            completed: items.iter().filter(|item| item.result().is_some()).count(),
            not_started,
            items,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            total,
            completed = report.completed,
            not_started = report.not_started,
            cancelled = cancel_token.is_cancelled(),
            elapsed_ms = report.elapsed_ms,
            "Batch finished"
        );
        report
    }
}
