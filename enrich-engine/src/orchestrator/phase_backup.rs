//! BACKUP_WATERFALL: consult backup sources in priority order until accepted

use super::{Orchestrator, Resolution, ResolutionState};
use crate::sources::SourceError;
use crate::types::{AttemptOutcome, RawFields};
use crate::validate::{corroborates, CORROBORATION_BOOST, CORROBORATION_CAP};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

impl Orchestrator {
    pub(super) async fn phase_backup(&self, run: &mut Resolution) -> ResolutionState {
        let mut after = None;

        while let Some(adapter) = self.waterfall.next_source(after) {
            let source = adapter.id();
            after = Some(source);

            if run.deadline_passed() {
                info!(key = %run.request.key, next = %source, "Request deadline reached, waterfall stopped");
                break;
            }

            let started_at = self.clock.now();
            let started = Instant::now();
            let incoming = match timeout_at(run.deadline(), adapter.lookup(&run.request)).await {
                Ok(Ok(fields)) => {
                    run.record_attempt(source, started_at, started, AttemptOutcome::Success, 0);
                    fields
                }
                Ok(Err(SourceError::NotApplicable)) => {
                    debug!(key = %run.request.key, source = %source, "Source not applicable");
                    continue;
                }
                Ok(Err(e)) => {
                    run.record_attempt(source, started_at, started, AttemptOutcome::Failure, 0);
                    match e {
                        SourceError::NotFound => debug!(key = %run.request.key, source = %source, "Source has no record"),
                        _ => warn!(key = %run.request.key, source = %source, error = %e, "Source lookup failed"),
                    }
                    continue;
                }
                Err(_) => {
                    run.record_attempt(source, started_at, started, AttemptOutcome::Timeout, 0);
                    warn!(key = %run.request.key, source = %source, "Source lookup cut off by request deadline");
                    break;
                }
            };

            let remaining = corroborate(&mut run.raw, incoming);
            let filled = run.raw.fill_unresolved(remaining, &run.current);
            self.revalidate(run).await;

            info!(
                key = %run.request.key,
                source = %source,
                filled = ?filled,
                confidence = run.current.overall_confidence,
                "Backup source merged"
            );

            if run.current.overall_confidence >= self.config.acceptance_threshold {
                debug!(key = %run.request.key, source = %source, "Acceptance reached, waterfall stopped");
                break;
            }
        }

        ResolutionState::Finalizing
    }
}

/// Raise existing candidates that `incoming` independently confirms
///
/// Returns the incoming candidates that confirmed nothing.
fn corroborate(raw: &mut RawFields, incoming: RawFields) -> RawFields {
    let mut remaining = RawFields::new();
    for (field, candidate) in incoming.iter() {
        match raw.get_mut(*field) {
            Some(existing) if corroborates(*field, &existing.value, &candidate.value) => {
                let boosted = existing
                    .confidence
                    .saturating_add(CORROBORATION_BOOST)
                    .min(CORROBORATION_CAP)
                    .max(existing.confidence);
                debug!(
                    field = %field,
                    by = %candidate.source,
                    from = existing.confidence,
                    to = boosted,
                    "Candidate corroborated"
                );
                existing.confidence = boosted;
            }
            _ => remaining.set(*field, candidate.clone()),
        }
    }
    remaining
}
