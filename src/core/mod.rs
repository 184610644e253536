// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Core engine module - orchestrates adapters, sessions, collection and sync

mod engine;
mod event_bus;
mod jobs;
mod scheduler;

pub use engine::{Orchestrator, OrchestratorBuilder};
pub use event_bus::{Event, EventBus, EventPayload, EventType};
pub use jobs::{AnchoredSyncJob, DataUploadJob};
pub use scheduler::{
    ExecutionBudget, Job, JobContext, RunOutcome, RunStatus, ScheduledTask, Scheduler, TaskKind, TaskResult, TaskRun,
    WindowReport,
};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::adapters::AdapterKind;
use crate::geofence::SessionKind;

/// System-wide state
#[derive(Debug, Clone, Serialize)]
pub struct SystemState {
    pub running: bool,
    pub adapters_active: usize,
    pub degraded_capabilities: Vec<AdapterKind>,
    pub open_sessions: Vec<SessionKind>,
    pub pending_batches: usize,
    pub failed_batches: usize,
    pub sync_degraded: bool,
    pub samples_ingested: u64,
    pub samples_rejected: u64,
    pub next_task_due: Option<DateTime<Utc>>,
    pub uptime_seconds: u64,
}
