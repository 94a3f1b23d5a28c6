//! Host Throttle
//!
//! Enforces a minimum spacing between requests to the same host. A single
//! task owns the per-host schedule and hands out time slots over a channel,
//! so every rate-limit decision is serialized without a shared lock.
//! Callers then sleep until their slot.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::warn;

/// Schedule size at which stale hosts are pruned
const PRUNE_THRESHOLD: usize = 4096;

struct SlotRequest {
    host: String,
    reply: oneshot::Sender<Instant>,
}

#[derive(Clone)]
pub struct HostThrottle {
    tx: mpsc::Sender<SlotRequest>,
    min_interval: Duration,
}

impl HostThrottle {
    /// Start the scheduling task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(min_interval: Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<SlotRequest>(256);

        tokio::spawn(async move {
            let mut next_allowed: HashMap<String, Instant> = HashMap::new();

            while let Some(request) = rx.recv().await {
                let now = Instant::now();
                let slot = match next_allowed.get(&request.host) {
                    Some(at) if *at > now => *at,
                    _ => now,
                };
                next_allowed.insert(request.host, slot + min_interval);

                if next_allowed.len() > PRUNE_THRESHOLD {
                    next_allowed.retain(|_, at| *at > now);
                }

                // Receiver gone means the caller gave up (deadline); the slot stays consumed
                let _ = request.reply.send(slot);
            }
        });

        Self { tx, min_interval }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for this caller's turn to contact `host`
    ///
    /// Fails open: if the scheduler is gone the caller proceeds immediately.
    pub async fn acquire(&self, host: &str) {
        let (reply, slot) = oneshot::channel();
        let request = SlotRequest {
            host: host.to_lowercase(),
            reply,
        };
        if self.tx.send(request).await.is_err() {
            warn!(host, "Host throttle unavailable, proceeding without spacing");
            return;
        }
        match slot.await {
            Ok(at) => tokio::time::sleep_until(at).await,
            Err(_) => warn!(host, "Host throttle dropped request, proceeding without spacing"),
        }
    }
}
