//! VALIDATING: score scraped candidates, decide whether backups are needed

use super::{Orchestrator, Resolution, ResolutionState};
use tracing::info;

impl Orchestrator {
    pub(super) async fn phase_validating(&self, run: &mut Resolution) -> ResolutionState {
        self.revalidate(run).await;

        info!(
            key = %run.request.key,
            confidence = run.current.overall_confidence,
            fields = run.current.non_null_count(),
            acceptance = self.config.acceptance_threshold,
            "Scraped data validated"
        );

        if run.current.overall_confidence >= self.config.acceptance_threshold {
            ResolutionState::Finalizing
        } else if run.deadline_passed() {
            info!(key = %run.request.key, "Request deadline reached, skipping backup sources");
            ResolutionState::Finalizing
        } else {
            ResolutionState::BackupWaterfall
        }
    }

    /// Rebuild the current result from every candidate gathered so far
    pub(super) async fn revalidate(&self, run: &mut Resolution) {
        run.current = self
            .validator
            .validate(&run.request.key, &run.raw, &mut run.ctx)
            .await;
    }
}
