// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Session state machine: one orthogonal Idle/Active machine per session kind

use std::collections::HashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{RegionTable, RegionTransition, SessionKind};
use crate::adapters::{HealthSample, SampleType};
use crate::error::{OrchestratorError, Result};

/// Source id stamped on samples derived from sessions
pub const SESSION_SOURCE_ID: &str = "geofence";

/// Activity-tracking session opened by a region entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySession {
    pub id: Uuid,
    pub kind: SessionKind,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub trigger_region_id: String,
}

impl ActivitySession {
    pub fn open(kind: SessionKind, started_at: DateTime<Utc>, trigger_region_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            started_at,
            ended_at: None,
            trigger_region_id: trigger_region_id.to_string(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Elapsed seconds; zero while open or when the exit arrived out of order
    pub fn duration_secs(&self) -> f64 {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0) as f64 / 1000.0)
            .unwrap_or(0.0)
    }

    /// Derived sample handed to the collector once the session is closed
    pub fn to_sample(&self, device_id: &str) -> Option<HealthSample> {
        let ended_at = self.ended_at?;
        let sample_type = match self.kind {
            SessionKind::Workout => SampleType::WorkoutSession,
            SessionKind::Sleep => SampleType::SleepSession,
        };
        Some(HealthSample::new(
            sample_type,
            self.duration_secs(),
            ended_at,
            SESSION_SOURCE_ID,
            device_id,
        ))
    }
}

/// Result of a transition
#[derive(Debug, Clone, PartialEq)]
pub enum SessionChange {
    Opened(ActivitySession),
    Closed(ActivitySession),
}

impl SessionChange {
    pub fn session(&self) -> &ActivitySession {
        match self {
            SessionChange::Opened(s) | SessionChange::Closed(s) => s,
        }
    }
}

/// Tracks open sessions, at most one per kind
pub struct SessionTracker {
    regions: RegionTable,
    open: HashMap<SessionKind, ActivitySession>,
}

impl SessionTracker {
    pub fn new(regions: RegionTable) -> Self {
        Self {
            regions,
            open: HashMap::new(),
        }
    }

    /// Reinstate sessions that were open when the process stopped
    pub fn restore(&mut self, sessions: impl IntoIterator<Item = ActivitySession>) {
        for session in sessions.into_iter().filter(ActivitySession::is_open) {
            if let Some(existing) = self.open.get(&session.kind) {
                warn!(
                    "Dropping restored {} session {}: {} already open",
                    session.kind, session.id, existing.id
                );
                continue;
            }
            info!("Restored open {} session {}", session.kind, session.id);
            self.open.insert(session.kind, session);
        }
    }

    /// Apply a region event.
    ///
    /// Duplicate entries and exits while idle are no-ops (`Ok(None)`);
    /// unknown region ids return `InvalidRegionEvent`.
    pub fn handle(
        &mut self,
        region_id: &str,
        transition: RegionTransition,
        at: DateTime<Utc>,
    ) -> Result<Option<SessionChange>> {
        let region = self
            .regions
            .get(region_id)
            .ok_or_else(|| OrchestratorError::InvalidRegionEvent(region_id.to_string()))?;
        let kind = region.kind.session_kind();

        match transition {
            RegionTransition::Enter => {
                if let Some(active) = self.open.get(&kind) {
                    debug!("{} already active ({}), ignoring entry to '{}'", kind, active.id, region_id);
                    return Ok(None);
                }
                let session = ActivitySession::open(kind, at, region_id);
                info!("Opened {} session {} at {}", kind, session.id, at);
                self.open.insert(kind, session.clone());
                Ok(Some(SessionChange::Opened(session)))
            }
            RegionTransition::Exit => {
                let matches = self
                    .open
                    .get(&kind)
                    .map(|s| s.trigger_region_id == region_id)
                    .unwrap_or(false);
                if !matches {
                    debug!("No {} session opened by '{}', ignoring exit", kind, region_id);
                    return Ok(None);
                }
                let Some(mut session) = self.open.remove(&kind) else {
                    return Ok(None);
                };
                session.ended_at = Some(at);
                info!(
                    "Closed {} session {} after {:.0}s",
                    kind,
                    session.id,
                    session.duration_secs()
                );
                Ok(Some(SessionChange::Closed(session)))
            }
        }
    }

    pub fn open_session(&self, kind: SessionKind) -> Option<&ActivitySession> {
        self.open.get(&kind)
    }

    pub fn open_sessions(&self) -> Vec<ActivitySession> {
        let mut sessions: Vec<_> = self.open.values().cloned().collect();
        sessions.sort_by_key(|s| s.kind);
        sessions
    }

    pub fn active_kinds(&self) -> Vec<SessionKind> {
        let mut kinds: Vec<_> = self.open.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn regions(&self) -> &RegionTable {
        &self.regions
    }
}
