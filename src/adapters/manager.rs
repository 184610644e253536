// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Adapter manager - starts event sources and tracks degraded capabilities

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tracing::{error, info, warn};

use super::{AdapterEvent, AdapterKind, EventSource, SourceStatus};
use crate::core::EventBus;
use crate::error::OrchestratorError;

/// Health of one event source
#[derive(Debug, Clone, Serialize)]
pub struct AdapterHealth {
    pub id: String,
    pub kind: AdapterKind,
    pub status: SourceStatus,
    pub error_count: u64,
    pub last_error: Option<String>,
}

/// Owns every push-style source
pub struct AdapterManager {
    sources: RwLock<HashMap<String, Box<dyn EventSource>>>,
    health: Mutex<HashMap<String, AdapterHealth>>,
    degraded: Mutex<BTreeMap<AdapterKind, String>>,
    start_timeout: Duration,
    events: Option<Arc<EventBus>>,
}

impl AdapterManager {
    pub fn new(start_timeout: Duration) -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
            health: Mutex::new(HashMap::new()),
            degraded: Mutex::new(BTreeMap::new()),
            start_timeout,
            events: None,
        }
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn add_source(&self, source: Box<dyn EventSource>) {
        let id = source.id().to_string();
        let kind = source.kind();

        self.health.lock().insert(
            id.clone(),
            AdapterHealth {
                id: id.clone(),
                kind,
                status: SourceStatus::Stopped,
                error_count: 0,
                last_error: None,
            },
        );
        self.sources.write().await.insert(id.clone(), source);

        info!("Added adapter: {} ({})", id, kind);
    }

    /// Start every source; failures degrade only the failing capability.
    ///
    /// Returns the number of sources that came up.
    pub async fn start_all(&self, events: mpsc::Sender<AdapterEvent>) -> usize {
        let mut sources = self.sources.write().await;
        let mut started = 0;

        for (id, source) in sources.iter_mut() {
            let kind = source.kind();
            self.set_status(id, SourceStatus::Starting, None);

            let failure = match timeout(self.start_timeout, source.start(events.clone())).await {
                Ok(Ok(())) => None,
                Ok(Err(e @ OrchestratorError::PermissionDenied { .. })) => Some(e.to_string()),
                Ok(Err(e)) => {
                    error!("Failed to start adapter {}: {}", id, e);
                    Some(e.to_string())
                }
                Err(_) => Some(format!("start timed out after {:?}", self.start_timeout)),
            };

            match failure {
                None => {
                    info!("Started adapter: {}", id);
                    self.set_status(id, SourceStatus::Active, None);
                    started += 1;
                }
                Some(reason) => {
                    self.set_status(id, SourceStatus::Degraded, Some(reason.clone()));
                    self.mark_degraded(kind, &reason);
                }
            }
        }

        started
    }

    pub async fn stop_all(&self) {
        let mut sources = self.sources.write().await;
        for (id, source) in sources.iter_mut() {
            if let Err(e) = source.stop().await {
                warn!("Error stopping {}: {}", id, e);
            }
            let mut health = self.health.lock();
            if let Some(h) = health.get_mut(id) {
                if h.status != SourceStatus::Degraded {
                    h.status = SourceStatus::Stopped;
                }
            }
        }
    }

    /// Record a lost capability; returns `true` the first time it is reported
    pub fn mark_degraded(&self, kind: AdapterKind, reason: &str) -> bool {
        let newly = self
            .degraded
            .lock()
            .insert(kind, reason.to_string())
            .is_none();

        if newly {
            warn!("Capability degraded: {} ({})", kind, reason);
            if let Some(events) = &self.events {
                events.publish_capability_degraded(kind, reason);
            }
        }
        newly
    }

    pub fn is_degraded(&self, kind: AdapterKind) -> bool {
        self.degraded.lock().contains_key(&kind)
    }

    /// Lost capabilities, in stable order
    pub fn degraded_capabilities(&self) -> Vec<AdapterKind> {
        self.degraded.lock().keys().copied().collect()
    }

    pub fn active_count(&self) -> usize {
        self.health
            .lock()
            .values()
            .filter(|h| h.status == SourceStatus::Active)
            .count()
    }

    pub fn health(&self) -> Vec<AdapterHealth> {
        let mut all: Vec<_> = self.health.lock().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    fn set_status(&self, id: &str, status: SourceStatus, error: Option<String>) {
        let mut health = self.health.lock();
        if let Some(h) = health.get_mut(id) {
            h.status = status;
            if let Some(e) = error {
                h.error_count += 1;
                h.last_error = Some(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::error::Result;

    /// Source whose start behaviour is fixed at construction
    struct StubSource {
        id: String,
        kind: AdapterKind,
        mode: &'static str,
        status: SourceStatus,
    }

    impl StubSource {
        fn boxed(id: &str, kind: AdapterKind, mode: &'static str) -> Box<dyn EventSource> {
            Box::new(Self {
                id: id.to_string(),
                kind,
                mode,
                status: SourceStatus::Stopped,
            })
        }
    }

    #[async_trait]
    impl EventSource for StubSource {
        fn id(&self) -> &str {
            &self.id
        }

        fn kind(&self) -> AdapterKind {
            self.kind
        }

        fn status(&self) -> SourceStatus {
            self.status
        }

        async fn start(&mut self, _events: mpsc::Sender<AdapterEvent>) -> Result<()> {
            match self.mode {
                "denied" => Err(OrchestratorError::PermissionDenied {
                    adapter: self.kind,
                    reason: "user declined".into(),
                }),
                "hang" => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }
                _ => {
                    self.status = SourceStatus::Active;
                    Ok(())
                }
            }
        }

        async fn stop(&mut self) -> Result<()> {
            self.status = SourceStatus::Stopped;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_degrade_only_their_capability() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe_events();
        let manager = AdapterManager::new(Duration::from_millis(5000)).with_event_bus(bus);

        manager.add_source(StubSource::boxed("motion", AdapterKind::Motion, "ok")).await;
        manager.add_source(StubSource::boxed("location", AdapterKind::Location, "denied")).await;
        manager.add_source(StubSource::boxed("health", AdapterKind::HealthStore, "hang")).await;

        let (tx, _events) = mpsc::channel(8);
        let started = manager.start_all(tx).await;

        assert_eq!(started, 1);
        assert_eq!(manager.active_count(), 1);
        assert_eq!(
            manager.degraded_capabilities(),
            vec![AdapterKind::Location, AdapterKind::HealthStore]
        );
        assert!(!manager.is_degraded(AdapterKind::Motion));
        assert!(rx.try_recv().is_ok());

        let health = manager.health();
        let hung = health.iter().find(|h| h.id == "health").unwrap();
        assert!(hung.last_error.as_deref().unwrap().contains("timed out"));
    }

    #[test]
    fn test_mark_degraded_reports_once() {
        let manager = AdapterManager::new(Duration::from_secs(1));
        assert!(manager.mark_degraded(AdapterKind::Motion, "revoked"));
        assert!(!manager.mark_degraded(AdapterKind::Motion, "revoked again"));
        assert_eq!(manager.degraded_capabilities(), vec![AdapterKind::Motion]);
    }
}
