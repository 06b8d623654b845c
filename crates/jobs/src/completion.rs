//! Artifact announcement on job completion.
//!
//! [`CompletionHandler`] listens on the wildcard channel and, for every
//! `finished` event, runs artifact resolution for that job. Jobs that left
//! anything behind get an `artifacts` metadata entry and an
//! `artifact-ready` event.

use std::sync::Arc;

use refinery_events::Subscription;
use tokio_util::sync::CancellationToken;

use crate::registry::JobRegistry;

/// Background service that announces artifacts of finished jobs.
pub struct CompletionHandler {
    registry: Arc<JobRegistry>,
    events: Subscription,
}

impl CompletionHandler {
    /// Subscribes immediately, so jobs finishing before [`run`](Self::run)
    /// is polled are still handled.
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        let events = registry.subscribe_all();
        Self { registry, events }
    }

    /// Run until `cancel` fires or the bus goes away.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Completion handler cancelled");
                    break;
                }
                event = self.events.recv() => {
                    let Some(event) = event else {
                        tracing::info!("Event bus closed, completion handler shutting down");
                        break;
                    };
                    if event.is_finished() {
                        self.handle_finished(&event.job_id).await;
                    }
                }
            }
        }
        self.events.unsubscribe();
    }

    async fn handle_finished(&self, job_id: &str) {
        match self.registry.resolve_artifacts(job_id, true).await {
            Ok(artifacts) if artifacts.is_empty() => {
                tracing::debug!(job_id, "Finished job produced no artifacts");
            }
            Ok(artifacts) => {
                tracing::debug!(job_id, count = artifacts.len(), "Announced artifacts");
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to resolve artifacts");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
