// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Background upload worker
//!
//! The worker never holds the queue lock across network I/O: it checks a
//! batch out, uploads the detached copy, then briefly re-locks to record the
//! outcome.

use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use super::{SyncQueue, UploadClient, UploadOutcome};
use crate::core::ExecutionBudget;

/// Tally of one drain pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub retrying: usize,
    pub failed: usize,
    /// Stopped by the budget while eligible batches remained
    pub interrupted: bool,
}

pub struct SyncWorker {
    queue: Arc<SyncQueue>,
    client: Arc<dyn UploadClient>,
    idle_poll: Duration,
}

impl SyncWorker {
    pub fn new(queue: Arc<SyncQueue>, client: Arc<dyn UploadClient>) -> Self {
        Self {
            queue,
            client,
            idle_poll: Duration::from_secs(60),
        }
    }

    /// Upper bound on how long the worker sleeps with nothing to do
    pub fn with_idle_poll(mut self, idle_poll: Duration) -> Self {
        self.idle_poll = idle_poll;
        self
    }

    pub fn queue(&self) -> &Arc<SyncQueue> {
        &self.queue
    }

    pub fn client(&self) -> &Arc<dyn UploadClient> {
        &self.client
    }

    /// Upload the oldest eligible batch, if any
    pub async fn upload_next(&self) -> Option<(Uuid, UploadOutcome)> {
        let batch = self.queue.checkout(Utc::now())?;

        let outcome = match self.client.upload(&batch).await {
            Ok(receipt) => {
                if receipt.duplicate {
                    debug!("Server already had batch {}", batch.id);
                }
                self.queue.record_success(batch.id)
            }
            Err(e) => self.queue.record_failure(batch.id, &e, Utc::now()),
        }?;

        Some((batch.id, outcome))
    }

    /// Upload until nothing is eligible or the budget asks us to yield
    pub async fn drain(&self, budget: Option<&ExecutionBudget>) -> DrainReport {
        let mut report = DrainReport::default();

        loop {
            if budget.map(ExecutionBudget::should_yield).unwrap_or(false) {
                report.interrupted = self.queue.has_eligible(Utc::now());
                break;
            }
            let Some((_, outcome)) = self.upload_next().await else {
                break;
            };
            report.attempted += 1;
            match outcome {
                UploadOutcome::Succeeded { .. } => report.succeeded += 1,
                UploadOutcome::Retrying { .. } => report.retrying += 1,
                UploadOutcome::Exhausted { .. } | UploadOutcome::Rejected { .. } => report.failed += 1,
            }
        }

        if report.attempted > 0 {
            debug!(
                "Drain: {} attempted, {} ok, {} retrying, {} failed",
                report.attempted, report.succeeded, report.retrying, report.failed
            );
        }
        report
    }

    /// Long-lived loop: drain, then sleep until new work, the next retry, or shutdown
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!("Sync worker started");

        loop {
            self.drain(None).await;

            let wait = self
                .queue
                .next_retry_at()
                .and_then(|at| (at - Utc::now()).to_std().ok())
                .unwrap_or(self.idle_poll)
                .min(self.idle_poll);

            tokio::select! {
                _ = self.queue.wait_for_work() => {}
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.recv() => {
                    info!("Sync worker shutting down...");
                    break;
                }
            }
        }
    }
}
