//! SCRAPING: fetch tier with bounded retry, render tier on escalation

use super::{Orchestrator, Resolution, ResolutionState};
use crate::extract::{extract_candidates, PageContent};
use crate::tiers::{FetchError, RenderError};
use crate::types::{AttemptOutcome, FieldName, RawField, SourceId};
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, warn};

/// How the fetch tier ended
enum FetchOutcome {
    /// A page came back (possibly thin)
    Page(PageContent),
    /// Terminal HTTP status; the page may still render
    Terminal,
    /// Host does not resolve; no tier can reach it
    UnreachableHost,
    /// Retries used up on retryable failures
    Exhausted,
    /// Request deadline hit during fetch or backoff
    DeadlineExceeded,
}

impl Orchestrator {
    pub(super) async fn phase_scraping(&self, run: &mut Resolution) -> ResolutionState {
        let Some(domain) = run.request.target_domain() else {
            debug!(key = %run.request.key, "No domain known, skipping scraping tiers");
            return ResolutionState::Validating;
        };

        run.raw.offer(
            FieldName::PrimaryDomain,
            RawField::text(domain.clone(), SourceId::Input.base_confidence(), SourceId::Input),
        );

        let url = format!("https://{}/", domain);
        let escalate = match self.fetch_with_retry(run, &domain, &url).await {
            FetchOutcome::Page(page) => {
                let sufficient = page.is_sufficient(self.config.min_content_length);
                run.raw
                    .absorb(extract_candidates(&page, SourceId::Fetch, Some(&domain)));
                if !sufficient {
                    info!(
                        key = %run.request.key,
                        visible_chars = page.visible_len(),
                        min = self.config.min_content_length,
                        "Fetched page too thin, escalating to render"
                    );
                }
                !sufficient
            }
            FetchOutcome::Terminal => true,
            FetchOutcome::Exhausted => {
                warn!(key = %run.request.key, "Fetch retries exhausted, escalating to render");
                true
            }
            FetchOutcome::UnreachableHost => {
                info!(key = %run.request.key, domain = %domain, "Host unreachable, skipping render");
                false
            }
            FetchOutcome::DeadlineExceeded => false,
        };

        if escalate && !run.deadline_passed() {
            self.render_once(run, &domain, &url).await;
        }

        ResolutionState::Validating
    }

    /// Up to `max_retries + 1` fetch attempts with exponential backoff between them
    async fn fetch_with_retry(&self, run: &mut Resolution, domain: &str, url: &str) -> FetchOutcome {
        let max_attempts = self.config.max_retries.saturating_add(1);

        for retry in 0..max_attempts {
            if retry > 0 {
                let wake_at = Instant::now()
                    .checked_add(self.config.backoff_delay(retry - 1))
                    .filter(|wake_at| *wake_at < run.deadline());
                let Some(wake_at) = wake_at else {
                    warn!(key = %run.request.key, retry, "Backoff would pass the request deadline");
                    return FetchOutcome::DeadlineExceeded;
                };
                sleep_until(wake_at).await;
            }

            if timeout_at(run.deadline(), self.throttle.acquire(domain)).await.is_err() {
                return FetchOutcome::DeadlineExceeded;
            }

            let started_at = self.clock.now();
            let started = Instant::now();
            let outcome = timeout_at(run.deadline(), self.fetcher.fetch(url)).await;

            match outcome {
                Err(_) => {
                    warn!(key = %run.request.key, url, retry, "Fetch cut off by request deadline");
                    run.record_attempt(SourceId::Fetch, started_at, started, AttemptOutcome::Timeout, retry);
                    return FetchOutcome::DeadlineExceeded;
                }
                Ok(Ok(response)) => {
                    debug!(
                        key = %run.request.key,
                        url,
                        status = response.status_code,
                        bytes = response.body.len(),
                        final_url = %response.final_url,
                        "Fetch succeeded"
                    );
                    run.record_attempt(SourceId::Fetch, started_at, started, AttemptOutcome::Success, retry);
                    run.ctx.memo.mark_reachable(domain);
                    return FetchOutcome::Page(PageContent::from_html(&response.body));
                }
                Ok(Err(e)) => {
                    let outcome = if e == FetchError::Timeout {
                        AttemptOutcome::Timeout
                    } else {
                        AttemptOutcome::Failure
                    };
                    run.record_attempt(SourceId::Fetch, started_at, started, outcome, retry);

                    if e.is_unreachable_host() {
                        if matches!(e, FetchError::DnsFailure(_)) {
                            run.ctx.memo.mark_unresolvable(domain);
                        }
                        return FetchOutcome::UnreachableHost;
                    }
                    if !e.is_retryable() {
                        info!(key = %run.request.key, url, error = %e, "Fetch failed terminally");
                        return FetchOutcome::Terminal;
                    }
                    warn!(
                        key = %run.request.key,
                        url,
                        retry,
                        max_retries = self.config.max_retries,
                        error = %e,
                        "Fetch failed, will retry"
                    );
                }
            }
        }

        FetchOutcome::Exhausted
    }

    /// One render attempt; candidates merge under the higher-confidence rule
    async fn render_once(&self, run: &mut Resolution, domain: &str, url: &str) {
        if timeout_at(run.deadline(), self.throttle.acquire(domain)).await.is_err() {
            return;
        }

        let started_at = self.clock.now();
        let started = Instant::now();
        match timeout_at(run.deadline(), self.renderer.render(url)).await {
            Ok(Ok(output)) => {
                run.record_attempt(SourceId::Render, started_at, started, AttemptOutcome::Success, 0);
                run.ctx.memo.mark_reachable(domain);
                let page = PageContent::from(output);
                let candidates = extract_candidates(&page, SourceId::Render, Some(domain));
                debug!(key = %run.request.key, url, candidates = candidates.len(), "Render succeeded");
                run.raw.absorb(candidates);
            }
            Ok(Err(RenderError::Unavailable)) => {
                debug!(key = %run.request.key, "Render tier not configured");
            }
            Ok(Err(e)) => {
                let outcome = if e == RenderError::Timeout {
                    AttemptOutcome::Timeout
                } else {
                    AttemptOutcome::Failure
                };
                run.record_attempt(SourceId::Render, started_at, started, outcome, 0);
                warn!(key = %run.request.key, url, error = %e, "Render failed");
            }
            Err(_) => {
                run.record_attempt(SourceId::Render, started_at, started, AttemptOutcome::Timeout, 0);
                warn!(key = %run.request.key, url, "Render cut off by request deadline");
            }
        }
    }
}
