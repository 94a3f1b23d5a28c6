//! Public entry points: single resolution, batch resolution, analytics

use crate::batch::{BatchCoordinator, BatchReport};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::ledger::{Analytics, LedgerError};
use crate::orchestrator::Orchestrator;
use crate::types::{EnrichmentResult, RequestHints};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct Engine {
    orchestrator: Arc<Orchestrator>,
    batch: BatchCoordinator,
}

impl Engine {
    pub fn new(orchestrator: Orchestrator) -> Self {
        let orchestrator = Arc::new(orchestrator);
        Self {
            batch: BatchCoordinator::new(orchestrator.clone()),
            orchestrator,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        self.orchestrator.config()
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub async fn resolve(&self, identifier: &str) -> Result<EnrichmentResult, EngineError> {
        self.orchestrator.resolve(identifier).await
    }

    pub async fn resolve_with_hints(
        &self,
        identifier: &str,
        hints: RequestHints,
    ) -> Result<EnrichmentResult, EngineError> {
        self.orchestrator.resolve_with_hints(identifier, hints).await
    }

    /// Resolve under a one-off policy; caches, ledger and throttle stay shared
    pub async fn resolve_with_config(
        &self,
        identifier: &str,
        config: EngineConfig,
    ) -> Result<EnrichmentResult, EngineError> {
        self.orchestrator.with_config(config)?.resolve(identifier).await
    }

    /// Resolve many identifiers with the configured (or given) pool size
    pub async fn resolve_batch(&self, identifiers: Vec<String>, concurrency: Option<usize>) -> BatchReport {
        self.resolve_batch_cancellable(identifiers, concurrency, CancellationToken::new())
            .await
    }

    pub async fn resolve_batch_cancellable(
        &self,
        identifiers: Vec<String>,
        concurrency: Option<usize>,
        cancel_token: CancellationToken,
    ) -> BatchReport {
        let concurrency = concurrency.unwrap_or(self.config().concurrency);
        self.batch
            .resolve_batch(identifiers, concurrency, cancel_token)
            .await
    }

    /// Batch under a one-off policy (thresholds, retries, pool size)
    pub async fn resolve_batch_with_config(
        &self,
        identifiers: Vec<String>,
        config: EngineConfig,
    ) -> Result<BatchReport, EngineError> {
        let concurrency = config.concurrency;
        let orchestrator = Arc::new(self.orchestrator.with_config(config)?);
        Ok(BatchCoordinator::new(orchestrator)
            .resolve_batch(identifiers, concurrency, CancellationToken::new())
            .await)
    }

    /// Ledger summary for entries at or after `since`
    pub async fn analytics(&self, since: DateTime<Utc>) -> Result<Analytics, LedgerError> {
        self.orchestrator.ledger().analytics(since).await
    }
}
