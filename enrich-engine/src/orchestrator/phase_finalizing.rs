//! FINALIZING: re-assert the discard invariant, cache, record the ledger entry

use super::{Orchestrator, Resolution, ResolutionState};
use crate::types::{CostLogEntry, ResolutionStatus};
use tracing::{debug, info};

impl Orchestrator {
    pub(super) async fn phase_finalizing(&self, run: &mut Resolution) -> ResolutionState {
        let discarded = run
            .current
            .enforce_discard_threshold(self.config.discard_threshold, self.config.acceptance_threshold);
        if !discarded.is_empty() {
            debug!(key = %run.request.key, discarded = ?discarded, "Fields nulled at finalization");
        }

        let ttl = match run.current.status {
            ResolutionStatus::Unresolved => self.config.negative_ttl(),
            ResolutionStatus::Resolved | ResolutionStatus::PartiallyResolved => self.config.positive_ttl(),
        };
        self.cache.put(run.key(), &run.current, ttl).await;

        let entry = CostLogEntry::from_attempts(run.key(), &run.current, &run.attempts, self.clock.now());
        info!(
            key = %run.request.key,
            status = entry.status.as_str(),
            confidence = entry.final_confidence,
            sources = ?run.current.sources,
            satisfied_by = ?entry.satisfied_by,
            estimated_cost = entry.estimated_cost,
            ttl_secs = ttl.as_secs(),
            "Result cached"
        );
        self.ledger.record(entry);

        ResolutionState::Done
    }
}
