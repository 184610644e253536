// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Error taxonomy shared by every subsystem of the orchestrator

use thiserror::Error;

use crate::adapters::AdapterKind;
use crate::sync::BatchStatus;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors surfaced by adapters, the scheduler, the collector and the sync pipeline
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Adapter unavailable or not authorized. Disables the owning subsystem only.
    #[error("permission denied for {adapter} adapter: {reason}")]
    PermissionDenied { adapter: AdapterKind, reason: String },

    /// Network or server unavailable; retried with backoff
    #[error("transient I/O failure: {0}")]
    TransientIo(String),

    /// Payload rejected by the remote side; never retried
    #[error("payload rejected: {0}")]
    PermanentRejection(String),

    /// Task did not finish within the host budget
    #[error("task '{task}' did not finish within the execution budget")]
    SchedulingOverrun { task: String },

    /// Region event for a geofence id that is not configured
    #[error("unknown geofence region '{0}'")]
    InvalidRegionEvent(String),

    /// Sample failed range validation
    #[error("sample rejected: {0}")]
    InvalidSample(String),

    #[error("task '{task}' panicked")]
    TaskPanicked { task: String },

    #[error("invalid batch transition {from:?} -> {to:?}")]
    InvalidTransition { from: BatchStatus, to: BatchStatus },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl OrchestratorError {
    /// Whether the failure should be retried by the sync pipeline
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientIo(_))
    }

    /// Whether the failure is an expected, non-user-facing condition
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            Self::SchedulingOverrun { .. } | Self::InvalidRegionEvent(_)
        )
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for OrchestratorError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for OrchestratorError {
    fn from(e: reqwest::Error) -> Self {
        // Anything that fails before a status line arrives is a connectivity problem
        Self::TransientIo(e.to_string())
    }
}
