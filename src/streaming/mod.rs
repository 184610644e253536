// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Streaming module - live status snapshots for an attached display

mod websocket;

pub use websocket::WebSocketSurface;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info};

use crate::adapters::{AdapterKind, HealthSample, SampleType};
use crate::error::Result;
use crate::geofence::SessionKind;

/// Latest-wins view of what the display should show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSnapshot {
    pub heart_rate: Option<f64>,
    pub steps: u64,
    pub active_energy_kcal: f64,
    pub active_sessions: Vec<SessionKind>,
    pub pending_batches: usize,
    pub sync_degraded: bool,
    pub degraded_capabilities: Vec<AdapterKind>,
    pub updated_at: DateTime<Utc>,
}

impl Default for LiveSnapshot {
    fn default() -> Self {
        Self {
            heart_rate: None,
            steps: 0,
            active_energy_kcal: 0.0,
            active_sessions: Vec::new(),
            pending_batches: 0,
            sync_degraded: false,
            degraded_capabilities: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Display surface (lock screen widget, watch face, dashboard socket)
#[async_trait]
pub trait DisplaySurface: Send + Sync {
    /// Whether anything is showing the snapshot right now
    fn is_attached(&self) -> bool;

    async fn push(&self, snapshot: &LiveSnapshot) -> Result<()>;
}

/// Result of one publish tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishResult {
    Published,
    NotAttached,
    Unchanged,
    /// Push failed; the snapshot is not retried
    Dropped,
}

struct LiveState {
    snapshot: LiveSnapshot,
    version: u64,
}

/// Coalesces state changes and pushes them at a fixed interval
pub struct LiveStatusPublisher {
    state: RwLock<LiveState>,
    published_version: AtomicU64,
    surface: Arc<dyn DisplaySurface>,
    interval: Duration,
}

impl LiveStatusPublisher {
    pub fn new(surface: Arc<dyn DisplaySurface>, interval: Duration) -> Self {
        Self {
            state: RwLock::new(LiveState {
                snapshot: LiveSnapshot::default(),
                version: 0,
            }),
            published_version: AtomicU64::new(0),
            surface,
            interval: interval.max(Duration::from_millis(10)),
        }
    }

    pub fn record_sample(&self, sample: &HealthSample) {
        self.update(|s| match sample.sample_type {
            SampleType::HeartRate => {
                if s.heart_rate == Some(sample.value) {
                    return false;
                }
                s.heart_rate = Some(sample.value);
                true
            }
            SampleType::StepCount => {
                s.steps += sample.value.max(0.0) as u64;
                true
            }
            SampleType::ActiveEnergy => {
                s.active_energy_kcal += sample.value.max(0.0);
                true
            }
            _ => false,
        });
    }

    pub fn record_sessions(&self, mut kinds: Vec<SessionKind>) {
        kinds.sort();
        self.update(|s| replace(&mut s.active_sessions, kinds));
    }

    pub fn record_sync(&self, pending_batches: usize, sync_degraded: bool) {
        self.update(|s| {
            let changed = s.pending_batches != pending_batches || s.sync_degraded != sync_degraded;
            s.pending_batches = pending_batches;
            s.sync_degraded = sync_degraded;
            changed
        });
    }

    pub fn record_capabilities(&self, mut degraded: Vec<AdapterKind>) {
        degraded.sort();
        self.update(|s| replace(&mut s.degraded_capabilities, degraded));
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        self.state.read().snapshot.clone()
    }

    /// Push the latest snapshot if something is attached and it changed
    pub async fn publish_once(&self) -> PublishResult {
        if !self.surface.is_attached() {
            return PublishResult::NotAttached;
        }

        let (snapshot, version) = {
            let state = self.state.read();
            (state.snapshot.clone(), state.version)
        };
        if version == self.published_version.load(Ordering::SeqCst) {
            return PublishResult::Unchanged;
        }
        // Latest wins: a failed push is superseded by the next change
        self.published_version.store(version, Ordering::SeqCst);

        match self.surface.push(&snapshot).await {
            Ok(()) => PublishResult::Published,
            Err(e) => {
                debug!("Live status push dropped: {}", e);
                PublishResult::Dropped
            }
        }
    }

    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!("Live status publisher started ({:?})", self.interval);
        let mut ticker = interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.publish_once().await;
                }
                _ = shutdown.recv() => {
                    info!("Live status publisher shutting down...");
                    break;
                }
            }
        }
    }

    fn update(&self, apply: impl FnOnce(&mut LiveSnapshot) -> bool) {
        let mut state = self.state.write();
        if apply(&mut state.snapshot) {
            state.snapshot.updated_at = Utc::now();
            state.version += 1;
        }
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSurface;

    fn hr(bpm: f64) -> HealthSample {
        HealthSample::new(SampleType::HeartRate, bpm, Utc::now(), "watch", "dev-1")
    }

    #[tokio::test]
    async fn test_no_push_while_detached() {
        let surface = Arc::new(RecordingSurface::new(false));
        let publisher = LiveStatusPublisher::new(surface.clone(), Duration::from_secs(5));

        publisher.record_sample(&hr(80.0));
        assert_eq!(publisher.publish_once().await, PublishResult::NotAttached);
        assert!(surface.pushed().is_empty());
    }

    #[tokio::test]
    async fn test_latest_wins_and_unchanged_is_skipped() {
        let surface = Arc::new(RecordingSurface::new(true));
        let publisher = LiveStatusPublisher::new(surface.clone(), Duration::from_secs(5));

        publisher.record_sample(&hr(80.0));
        publisher.record_sample(&hr(95.0));
        publisher.record_sessions(vec![SessionKind::Workout]);
        assert_eq!(publisher.publish_once().await, PublishResult::Published);
        assert_eq!(publisher.publish_once().await, PublishResult::Unchanged);

        let pushed = surface.pushed();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].heart_rate, Some(95.0));
        assert_eq!(pushed[0].active_sessions, vec![SessionKind::Workout]);
    }

    #[tokio::test]
    async fn test_failed_push_is_not_retried() {
        let surface = Arc::new(RecordingSurface::new(true));
        let publisher = LiveStatusPublisher::new(surface.clone(), Duration::from_secs(5));

        publisher.record_sync(4, false);
        surface.fail_next();
        assert_eq!(publisher.publish_once().await, PublishResult::Dropped);
        assert_eq!(publisher.publish_once().await, PublishResult::Unchanged);

        publisher.record_sync(4, true);
        assert_eq!(publisher.publish_once().await, PublishResult::Published);
        assert!(surface.pushed()[0].sync_degraded);
    }

    #[tokio::test]
    async fn test_steps_accumulate() {
        let surface = Arc::new(RecordingSurface::new(true));
        let publisher = LiveStatusPublisher::new(surface, Duration::from_secs(5));
        for _ in 0..3 {
            publisher.record_sample(&HealthSample::new(SampleType::StepCount, 40.0, Utc::now(), "phone", "dev-1"));
        }
        assert_eq!(publisher.snapshot().steps, 120);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_pushes_on_interval() {
        let surface = Arc::new(RecordingSurface::new(true));
        let publisher = Arc::new(LiveStatusPublisher::new(surface.clone(), Duration::from_secs(5)));
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn({
            let publisher = publisher.clone();
            async move { publisher.run(rx).await }
        });

        publisher.record_sample(&hr(70.0));
        tokio::time::sleep(Duration::from_secs(6)).await;
        publisher.record_sample(&hr(72.0));
        tokio::time::sleep(Duration::from_secs(5)).await;

        tx.send(()).unwrap();
        handle.await.unwrap();
        let rates: Vec<_> = surface.pushed().iter().map(|s| s.heart_rate).collect();
        assert_eq!(rates, vec![Some(70.0), Some(72.0)]);
    }
}
