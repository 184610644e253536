// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! VitalSync - Background Health Monitoring and Sync Orchestrator
//!
//! Keeps a device's health data flowing while the app is mostly asleep:
//! - Geofence-driven workout and sleep sessions
//! - Budget-aware recurring tasks with checkpoint/resume
//! - Per-channel batching with size and age limits
//! - Durable upload queue with idempotent retries and backoff
//! - Rate-limited live status for a glanceable surface
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌──────────┐  │
//! │  │ Adapters │ → │ Geofence │ → │ Collector │ → │   Sync   │  │
//! │  │ (events) │   │ Sessions │   │ (batches) │   │  Queue   │  │
//! │  └──────────┘   └──────────┘   └───────────┘   └──────────┘  │
//! │       ↓              ↓               ↑               ↓       │
//! │  ┌──────────┐   ┌───────────────────────────┐   ┌──────────┐ │
//! │  │Scheduler │ → │         Event Bus         │   │  Worker  │ │
//! │  │ (windows)│   └───────────────────────────┘   │ (upload) │ │
//! │  └──────────┘                ↓                  └──────────┘ │
//! │  ┌──────────┐   ┌───────────────────────────┐                │
//! │  │ Database │   │   Live Status Publisher   │                │
//! │  └──────────┘   └───────────────────────────┘                │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod collector;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod geofence;
pub mod streaming;
pub mod sync;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use adapters::{AdapterEvent, AdapterKind, HealthSample, SampleType};
pub use config::Config;
pub use self::core::{EventBus, Orchestrator, OrchestratorBuilder, SystemState};
pub use db::Database;
pub use error::{OrchestratorError, Result};
pub use geofence::{SessionKind, SessionTracker};
pub use sync::{SyncBatch, SyncQueue};

/// VitalSync version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// VitalSync name
pub const NAME: &str = "VitalSync";
