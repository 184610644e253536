// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Durable FIFO of upload batches with capped exponential retry

use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{BatchStatus, RetryPolicy, SyncBatch};
use crate::core::EventBus;
use crate::db::Database;
use crate::error::{OrchestratorError, Result};

/// What happened to a batch after an upload attempt
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Succeeded { attempts: u32 },
    /// Transient failure; eligible again after `delay`
    Retrying { attempt: u32, delay: Duration },
    /// Transient failures exceeded the ceiling
    Exhausted { attempts: u32 },
    /// Remote validation rejected the payload
    Rejected { reason: String },
}

impl UploadOutcome {
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, UploadOutcome::Exhausted { .. } | UploadOutcome::Rejected { .. })
    }
}

/// Upload queue; batches are kept ordered by `created_at`
pub struct SyncQueue {
    batches: Mutex<Vec<SyncBatch>>,
    policy: RetryPolicy,
    degraded_threshold: usize,
    store: Option<Arc<Database>>,
    events: Option<Arc<EventBus>>,
    work: Notify,
}

impl SyncQueue {
    pub fn new(policy: RetryPolicy, degraded_threshold: usize) -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            policy,
            degraded_threshold: degraded_threshold.max(1),
            store: None,
            events: None,
            work: Notify::new(),
        }
    }

    pub fn with_store(mut self, store: Arc<Database>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Reload pending and failed batches persisted by a previous run
    pub fn restore(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let restored = store.load_batches()?;
        let count = restored.len();

        let mut batches = self.batches.lock();
        for mut batch in restored {
            if batch.status == BatchStatus::Uploading {
                // Interrupted mid-flight; the idempotency key makes a resend safe
                batch.status = BatchStatus::Pending;
                store.save_batch(&batch)?;
            }
            insert_ordered(&mut batches, batch);
        }
        drop(batches);

        if count > 0 {
            info!("Restored {} unsent batches", count);
            self.work.notify_one();
        }
        Ok(count)
    }

    /// Accept a freshly built batch in `pending` state
    pub fn enqueue(&self, batch: SyncBatch) -> Result<()> {
        if batch.status != BatchStatus::Pending {
            return Err(OrchestratorError::InvalidTransition {
                from: batch.status,
                to: BatchStatus::Pending,
            });
        }
        // Keep the batch in memory even if the write fails; it is re-persisted
        // on its next transition
        self.persist(&batch);

        let (id, channel, len) = (batch.id, batch.channel, batch.len());
        insert_ordered(&mut self.batches.lock(), batch);
        debug!("Queued batch {} ({} samples, {:?})", id, len, channel);

        if let Some(events) = &self.events {
            events.publish_batch_queued(id, channel, len);
        }
        self.work.notify_one();
        Ok(())
    }

    /// Detach the oldest eligible batch for upload, marking it `uploading`.
    ///
    /// The returned copy is owned by the caller so the lock is not held
    /// across the network call.
    pub fn checkout(&self, now: DateTime<Utc>) -> Option<SyncBatch> {
        let mut batches = self.batches.lock();
        let batch = batches.iter_mut().find(|b| b.is_eligible(now))?;

        if batch.status == BatchStatus::Failed {
            if let Err(e) = batch.transition(BatchStatus::Pending) {
                warn!("Cannot re-arm batch {}: {}", batch.id, e);
                return None;
            }
            batch.retry_at = None;
        }
        if let Err(e) = batch.transition(BatchStatus::Uploading) {
            warn!("Cannot check out batch {}: {}", batch.id, e);
            return None;
        }
        self.persist(batch);
        Some(batch.clone())
    }

    /// Record a 2xx acceptance; the batch is purged
    pub fn record_success(&self, id: Uuid) -> Option<UploadOutcome> {
        let mut batches = self.batches.lock();
        let index = batches.iter().position(|b| b.id == id)?;

        if let Err(e) = batches[index].transition(BatchStatus::Succeeded) {
            warn!("Ignoring success for batch {}: {}", id, e);
            return None;
        }
        let batch = batches.remove(index);
        drop(batches);

        if let Some(store) = &self.store {
            if let Err(e) = store.delete_batch(&batch.id) {
                warn!("Failed to purge batch {}: {}", batch.id, e);
            }
        }
        info!("Batch {} uploaded after {} failed attempts", batch.id, batch.attempt_count);
        if let Some(events) = &self.events {
            events.publish_batch_uploaded(batch.id, batch.attempt_count);
        }
        Some(UploadOutcome::Succeeded {
            attempts: batch.attempt_count,
        })
    }

    /// Record a failed attempt and decide between backoff and terminal failure
    pub fn record_failure(
        &self,
        id: Uuid,
        error: &OrchestratorError,
        now: DateTime<Utc>,
    ) -> Option<UploadOutcome> {
        let mut batches = self.batches.lock();
        let batch = batches.iter_mut().find(|b| b.id == id)?;

        if let Err(e) = batch.transition(BatchStatus::Failed) {
            warn!("Ignoring failure for batch {}: {}", id, e);
            return None;
        }
        batch.last_error = Some(error.to_string());

        let outcome = if error.is_transient() {
            batch.attempt_count += 1;
            if self.policy.exhausted(batch.attempt_count) {
                batch.retry_at = None;
                UploadOutcome::Exhausted {
                    attempts: batch.attempt_count,
                }
            } else {
                let delay = self.policy.backoff(batch.attempt_count);
                batch.retry_at = Some(now + to_chrono(delay));
                UploadOutcome::Retrying {
                    attempt: batch.attempt_count,
                    delay,
                }
            }
        } else {
            batch.retry_at = None;
            UploadOutcome::Rejected {
                reason: error.to_string(),
            }
        };
        self.persist(batch);

        match &outcome {
            UploadOutcome::Retrying { attempt, delay } => {
                warn!("Batch {} attempt {} failed ({}), retrying in {:?}", id, attempt, error, delay);
            }
            _ => {
                error!("Batch {} failed permanently after {} attempts: {}", id, batch.attempt_count, error);
                if let Some(events) = &self.events {
                    events.publish_batch_failed(id, batch.attempt_count, &error.to_string());
                }
            }
        }
        Some(outcome)
    }

    /// Re-arm a terminally failed batch from diagnostics
    pub fn retry_failed(&self, id: Uuid, now: DateTime<Utc>) -> bool {
        let mut batches = self.batches.lock();
        let Some(batch) = batches.iter_mut().find(|b| b.id == id && b.is_terminal()) else {
            return false;
        };
        batch.attempt_count = 0;
        batch.retry_at = Some(now);
        self.persist(batch);
        drop(batches);

        info!("Batch {} re-armed for upload", id);
        self.work.notify_one();
        true
    }

    /// Drop every terminally failed batch; returns how many were removed
    pub fn discard_failed(&self) -> usize {
        let mut batches = self.batches.lock();
        let (failed, kept): (Vec<_>, Vec<_>) = batches.drain(..).partition(SyncBatch::is_terminal);
        *batches = kept;
        drop(batches);

        if let Some(store) = &self.store {
            for batch in &failed {
                if let Err(e) = store.delete_batch(&batch.id) {
                    warn!("Failed to discard batch {}: {}", batch.id, e);
                }
            }
        }
        failed.len()
    }

    pub fn get(&self, id: Uuid) -> Option<SyncBatch> {
        self.batches.lock().iter().find(|b| b.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.lock().is_empty()
    }

    /// Batches still on their way to the server
    pub fn pending_count(&self) -> usize {
        self.batches.lock().iter().filter(|b| !b.is_terminal()).count()
    }

    /// Batches that will not be retried
    pub fn failed_count(&self) -> usize {
        self.batches.lock().iter().filter(|b| b.is_terminal()).count()
    }

    /// User-visible "sync degraded" indicator
    pub fn sync_degraded(&self) -> bool {
        self.failed_count() >= self.degraded_threshold
    }

    /// Earliest moment a waiting batch becomes eligible
    pub fn next_retry_at(&self) -> Option<DateTime<Utc>> {
        self.batches
            .lock()
            .iter()
            .filter(|b| b.status == BatchStatus::Failed)
            .filter_map(|b| b.retry_at)
            .min()
    }

    /// Whether anything is eligible right now
    pub fn has_eligible(&self, now: DateTime<Utc>) -> bool {
        self.batches.lock().iter().any(|b| b.is_eligible(now))
    }

    /// Resolves once a batch is enqueued or re-armed
    pub async fn wait_for_work(&self) {
        self.work.notified().await;
    }

    fn persist(&self, batch: &SyncBatch) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_batch(batch) {
                warn!("Failed to persist batch {}: {}", batch.id, e);
            }
        }
    }
}

fn insert_ordered(batches: &mut Vec<SyncBatch>, batch: SyncBatch) {
    let at = batches.partition_point(|b| b.created_at <= batch.created_at);
    batches.insert(at, batch);
}

fn to_chrono(delay: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(delay.as_millis().min(i64::MAX as u128) as i64)
}
