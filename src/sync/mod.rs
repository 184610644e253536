// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Sync module - durable batch queue, upload client and background worker
//!
//! Batches move through a small state machine:
//!
//! ```text
//! pending ──► uploading ──► succeeded
//!    ▲            │
//!    │            ▼
//!    └──(retry)── failed ──(ceiling / permanent)──► terminal
//! ```
//!
//! `failed → pending` is the only backward edge and is only taken while the
//! batch still has a `retry_at`, i.e. while the attempt ceiling has not been
//! exceeded.

mod client;
mod queue;
mod worker;

pub use client::{HttpUploadClient, UploadClient, UploadReceipt};
pub use queue::{SyncQueue, UploadOutcome};
pub use worker::{DrainReport, SyncWorker};

use std::time::Duration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapters::{Channel, HealthSample};
use crate::config::SyncConfig;
use crate::error::{OrchestratorError, Result};

/// Upload status of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Uploading,
    Succeeded,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Uploading => "uploading",
            BatchStatus::Succeeded => "succeeded",
            BatchStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BatchStatus::Pending),
            "uploading" => Some(BatchStatus::Uploading),
            "succeeded" => Some(BatchStatus::Succeeded),
            "failed" => Some(BatchStatus::Failed),
            _ => None,
        }
    }
}

/// Immutable group of samples shipped as one upload attempt sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncBatch {
    pub id: Uuid,
    pub channel: Channel,
    pub samples: Vec<HealthSample>,
    pub created_at: DateTime<Utc>,
    pub attempt_count: u32,
    pub status: BatchStatus,

    /// Set while a failed batch is still eligible for retry
    pub retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SyncBatch {
    pub fn new(channel: Channel, samples: Vec<HealthSample>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel,
            samples,
            created_at,
            attempt_count: 0,
            status: BatchStatus::Pending,
            retry_at: None,
            last_error: None,
        }
    }

    /// Stable key the server uses to drop duplicate deliveries
    pub fn idempotency_key(&self) -> String {
        self.id.to_string()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Failed with no retry left
    pub fn is_terminal(&self) -> bool {
        match self.status {
            BatchStatus::Succeeded => true,
            BatchStatus::Failed => self.retry_at.is_none(),
            _ => false,
        }
    }

    /// Whether the worker may pick this batch up at `now`
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            BatchStatus::Pending => true,
            BatchStatus::Failed => self.retry_at.map(|at| at <= now).unwrap_or(false),
            _ => false,
        }
    }

    /// Move to `next`, enforcing the forward-only lifecycle
    pub fn transition(&mut self, next: BatchStatus) -> Result<()> {
        use BatchStatus::*;

        let allowed = match (self.status, next) {
            (Pending, Uploading) => true,
            (Uploading, Succeeded) | (Uploading, Failed) => true,
            (Failed, Pending) => self.retry_at.is_some(),
            _ => false,
        };
        if !allowed {
            return Err(OrchestratorError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Retry ceiling and exponential backoff
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Batches whose attempt count exceeds this are failed terminally
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    /// `base * 2^attempt`, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.cap)
            .min(self.cap)
    }

    pub fn exhausted(&self, attempt_count: u32) -> bool {
        attempt_count > self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base: Duration::from_secs(2),
            cap: Duration::from_secs(900),
        }
    }
}

impl From<&SyncConfig> for RetryPolicy {
    fn from(config: &SyncConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base: Duration::from_millis(config.backoff_base_ms),
            cap: Duration::from_millis(config.backoff_cap_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_then_caps() {
        let policy = RetryPolicy {
            max_attempts: 8,
            base: Duration::from_secs(2),
            cap: Duration::from_secs(60),
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(4));
        assert_eq!(policy.backoff(2), Duration::from_secs(8));
        assert_eq!(policy.backoff(3), Duration::from_secs(16));
        assert_eq!(policy.backoff(5), Duration::from_secs(60));
        assert_eq!(policy.backoff(40), Duration::from_secs(60));
    }

    #[test]
    fn test_ceiling_is_exclusive() {
        let policy = RetryPolicy::default();
        assert!(!policy.exhausted(8));
        assert!(policy.exhausted(9));
    }

    #[test]
    fn test_forward_only_transitions() {
        let mut batch = SyncBatch::new(Channel::Health, vec![], Utc::now());
        assert!(batch.transition(BatchStatus::Succeeded).is_err());
        batch.transition(BatchStatus::Uploading).unwrap();
        assert!(batch.transition(BatchStatus::Pending).is_err());
        batch.transition(BatchStatus::Failed).unwrap();

        // Terminal failure: no retry armed
        assert!(batch.transition(BatchStatus::Pending).is_err());

        batch.retry_at = Some(Utc::now());
        batch.transition(BatchStatus::Pending).unwrap();
        assert_eq!(batch.status, BatchStatus::Pending);
    }

    #[test]
    fn test_eligibility() {
        let now = Utc::now();
        let mut batch = SyncBatch::new(Channel::Health, vec![], now);
        assert!(batch.is_eligible(now));

        batch.status = BatchStatus::Failed;
        batch.retry_at = Some(now + chrono::Duration::seconds(30));
        assert!(!batch.is_eligible(now));
        assert!(batch.is_eligible(now + chrono::Duration::seconds(30)));
        assert!(!batch.is_terminal());

        batch.retry_at = None;
        assert!(!batch.is_eligible(now + chrono::Duration::days(1)));
        assert!(batch.is_terminal());
    }
}
