// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Event bus for inter-component communication

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::scheduler::RunOutcome;
use crate::adapters::{AdapterKind, Channel, HealthSample};
use crate::geofence::ActivitySession;

/// Event types in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Sample,
    Session,
    Sync,
    Task,
    Capability,
    Error,
}

/// Generic event wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Sample(HealthSample),
    SessionOpened(ActivitySession),
    SessionClosed(ActivitySession),
    BatchQueued { batch_id: Uuid, channel: Channel, samples: usize },
    BatchUploaded { batch_id: Uuid, attempts: u32 },
    BatchFailed { batch_id: Uuid, attempts: u32, reason: String },
    TaskFinished { task_id: String, outcome: String },
    CapabilityDegraded { adapter: AdapterKind, reason: String },
    Error { message: String },
}

/// Central event bus for pub/sub communication
pub struct EventBus {
    sample_tx: broadcast::Sender<HealthSample>,
    event_tx: broadcast::Sender<Event>,
    event_counter: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sample_tx, _) = broadcast::channel(capacity.max(1));
        let (event_tx, _) = broadcast::channel(capacity.max(1));

        Self {
            sample_tx,
            event_tx,
            event_counter: AtomicU64::new(0),
        }
    }

    pub fn publish_sample(&self, sample: HealthSample) {
        let _ = self.sample_tx.send(sample.clone());
        self.publish_event(EventType::Sample, EventPayload::Sample(sample));
    }

    pub fn publish_session_opened(&self, session: ActivitySession) {
        self.publish_event(EventType::Session, EventPayload::SessionOpened(session));
    }

    pub fn publish_session_closed(&self, session: ActivitySession) {
        self.publish_event(EventType::Session, EventPayload::SessionClosed(session));
    }

    pub fn publish_batch_queued(&self, batch_id: Uuid, channel: Channel, samples: usize) {
        self.publish_event(
            EventType::Sync,
            EventPayload::BatchQueued {
                batch_id,
                channel,
                samples,
            },
        );
    }

    pub fn publish_batch_uploaded(&self, batch_id: Uuid, attempts: u32) {
        self.publish_event(EventType::Sync, EventPayload::BatchUploaded { batch_id, attempts });
    }

    pub fn publish_batch_failed(&self, batch_id: Uuid, attempts: u32, reason: &str) {
        self.publish_event(
            EventType::Sync,
            EventPayload::BatchFailed {
                batch_id,
                attempts,
                reason: reason.to_string(),
            },
        );
    }

    pub fn publish_task_finished(&self, task_id: &str, outcome: &RunOutcome) {
        let outcome = match outcome {
            RunOutcome::Completed => "completed".to_string(),
            RunOutcome::Checkpointed(token) => format!("checkpointed at {}", token),
            RunOutcome::Failed(reason) => format!("failed: {}", reason),
        };
        self.publish_event(
            EventType::Task,
            EventPayload::TaskFinished {
                task_id: task_id.to_string(),
                outcome,
            },
        );
    }

    pub fn publish_capability_degraded(&self, adapter: AdapterKind, reason: &str) {
        self.publish_event(
            EventType::Capability,
            EventPayload::CapabilityDegraded {
                adapter,
                reason: reason.to_string(),
            },
        );
    }

    pub fn publish_error(&self, message: &str) {
        self.publish_event(
            EventType::Error,
            EventPayload::Error {
                message: message.to_string(),
            },
        );
    }

    fn publish_event(&self, event_type: EventType, payload: EventPayload) {
        let id = self.event_counter.fetch_add(1, Ordering::Relaxed);
        let event = Event {
            id,
            event_type,
            timestamp: Utc::now(),
            payload,
        };
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe_samples(&self) -> broadcast::Receiver<HealthSample> {
        self.sample_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Total events published since start
    pub fn published(&self) -> u64 {
        self.event_counter.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe_events();

        let id = Uuid::new_v4();
        bus.publish_batch_queued(id, Channel::Health, 3);
        bus.publish_batch_uploaded(id, 0);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.id, 0);
        assert!(matches!(first.payload, EventPayload::BatchQueued { samples: 3, .. }));
        assert!(matches!(second.payload, EventPayload::BatchUploaded { attempts: 0, .. }));
        assert_eq!(bus.published(), 2);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish_error("nobody listening");
        assert_eq!(bus.published(), 1);
    }
}
