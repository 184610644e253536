// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Orchestrator - wires adapters, sessions, collection, scheduling and sync
//!
//! Adapter events arrive on one channel and are applied by a single loop, so
//! session state has exactly one writer. Execution windows are handed to the
//! scheduler on their own task so a long window never stalls event intake.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::jobs::{AnchoredSyncJob, DataUploadJob};
use super::scheduler::{ExecutionBudget, ScheduledTask, Scheduler, TaskKind, WindowReport};
use super::{EventBus, SystemState};
use crate::adapters::{AdapterEvent, AdapterKind, AdapterManager, AnchoredSource, EventSource, HealthSample};
use crate::collector::{Collector, FlushReason};
use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::geofence::{ActivitySession, RegionTable, RegionTransition, SessionChange, SessionTracker};
use crate::streaming::{DisplaySurface, LiveStatusPublisher, WebSocketSurface};
use crate::sync::{HttpUploadClient, RetryPolicy, SyncQueue, SyncWorker, UploadClient};

const PUSH_TOKEN_KEY: &str = "push_token";
const UPLOAD_TASK_ID: &str = "data_upload";

/// Assembles an [`Orchestrator`] from config plus optional host adapters
pub struct OrchestratorBuilder {
    config: Config,
    client: Option<Arc<dyn UploadClient>>,
    surface: Option<Arc<dyn DisplaySurface>>,
    store: Option<Arc<Database>>,
    sources: Vec<Box<dyn EventSource>>,
    anchored: Vec<(TaskKind, Arc<dyn AnchoredSource>)>,
}

impl OrchestratorBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            client: None,
            surface: None,
            store: None,
            sources: Vec::new(),
            anchored: Vec::new(),
        }
    }

    pub fn upload_client(mut self, client: Arc<dyn UploadClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn display(mut self, surface: Arc<dyn DisplaySurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn database(mut self, store: Arc<Database>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn source(mut self, source: Box<dyn EventSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Pull source polled by a recurring task of `kind`
    pub fn anchored_source(mut self, kind: TaskKind, source: Arc<dyn AnchoredSource>) -> Self {
        self.anchored.push((kind, source));
        self
    }

    pub async fn build(self) -> Result<Orchestrator> {
        let config = Arc::new(self.config);
        let events = Arc::new(EventBus::new(1024));

        let store = match self.store {
            Some(store) => Some(store),
            None if config.database.enabled => Some(Arc::new(Database::open(&config.database)?)),
            None => None,
        };

        let mut queue = SyncQueue::new(RetryPolicy::from(&config.sync), config.sync.degraded_threshold)
            .with_event_bus(events.clone());
        if let Some(store) = &store {
            queue = queue.with_store(store.clone());
        }
        let queue = Arc::new(queue);
        queue.restore()?;

        let client = match self.client {
            Some(client) => client,
            None => Arc::new(HttpUploadClient::new(
                &config.sync.endpoint,
                Duration::from_secs(config.sync.request_timeout_secs),
            )?),
        };
        let surface = self.surface.unwrap_or_else(|| {
            Arc::new(WebSocketSurface::new(
                config.live_status.websocket_port,
                config.live_status.websocket_max_clients,
            ))
        });

        let collector = Arc::new(Collector::new(&config.collector, queue.clone()));
        let worker = Arc::new(
            SyncWorker::new(queue.clone(), client)
                .with_idle_poll(Duration::from_secs(config.sync.idle_poll_secs.max(1))),
        );
        let publisher = Arc::new(LiveStatusPublisher::new(
            surface,
            Duration::from_secs(config.live_status.interval_secs.max(1)),
        ));

        let mut sessions = SessionTracker::new(RegionTable::new(config.geofence.to_regions()));
        if let Some(store) = &store {
            sessions.restore(store.load_open_sessions()?);
        }
        publisher.record_sessions(sessions.active_kinds());
        publisher.record_sync(queue.pending_count(), queue.sync_degraded());

        let mut scheduler = Scheduler::new().with_event_bus(events.clone());
        if let Some(store) = &store {
            scheduler = scheduler.with_store(store.clone());
        }
        let scheduler = Arc::new(scheduler);

        let now = Utc::now();
        for (kind, source) in self.anchored {
            let interval = match kind {
                TaskKind::HealthSync => config.scheduler.health_sync_interval_secs,
                TaskKind::LocationSync => config.scheduler.location_sync_interval_secs,
                TaskKind::DataUpload => config.scheduler.upload_interval_secs,
            };
            let id = format!("{}:{}", kind.as_str(), source.name());
            let mut job = AnchoredSyncJob::new(source, collector.clone(), config.scheduler.page_size);
            if let Some(store) = &store {
                job = job.with_store(store.clone());
            }
            scheduler.register(ScheduledTask::new(&id, kind, interval, now), Arc::new(job))?;
        }
        // Upload sorts after the pollers so a window ships what it just pulled
        scheduler.register(
            ScheduledTask::new(
                UPLOAD_TASK_ID,
                TaskKind::DataUpload,
                config.scheduler.upload_interval_secs,
                now + chrono::Duration::seconds(1),
            ),
            Arc::new(DataUploadJob::new(collector.clone(), worker.clone())),
        )?;

        let adapters = AdapterManager::new(Duration::from_millis(config.adapters.start_timeout_ms))
            .with_event_bus(events.clone());
        for source in self.sources {
            adapters.add_source(source).await;
        }

        info!(
            "Orchestrator ready: {} regions, {} tasks, {} unsent batches",
            sessions.regions().len(),
            scheduler.tasks().len(),
            queue.len()
        );

        Ok(Orchestrator {
            config,
            events,
            store,
            queue,
            collector,
            worker,
            scheduler,
            sessions: Mutex::new(sessions),
            adapters,
            publisher,
            running: AtomicBool::new(false),
            start_time: Mutex::new(None),
        })
    }
}

/// Background monitoring and sync orchestrator
pub struct Orchestrator {
    config: Arc<Config>,
    events: Arc<EventBus>,
    store: Option<Arc<Database>>,
    queue: Arc<SyncQueue>,
    collector: Arc<Collector>,
    worker: Arc<SyncWorker>,
    scheduler: Arc<Scheduler>,
    sessions: Mutex<SessionTracker>,
    adapters: AdapterManager,
    publisher: Arc<LiveStatusPublisher>,
    running: AtomicBool,
    start_time: Mutex<Option<Instant>>,
}

impl Orchestrator {
    pub fn builder(config: Config) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn queue(&self) -> &Arc<SyncQueue> {
        &self.queue
    }

    pub fn collector(&self) -> &Arc<Collector> {
        &self.collector
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn publisher(&self) -> &Arc<LiveStatusPublisher> {
        &self.publisher
    }

    pub fn adapters(&self) -> &AdapterManager {
        &self.adapters
    }

    pub fn open_sessions(&self) -> Vec<ActivitySession> {
        self.sessions.lock().open_sessions()
    }

    /// Start every adapter feeding `tx`; returns how many came up
    pub async fn start_adapters(&self, tx: mpsc::Sender<AdapterEvent>) -> usize {
        let started = self.adapters.start_all(tx).await;
        self.publisher.record_capabilities(self.adapters.degraded_capabilities());
        started
    }

    /// Run until `shutdown_tx` fires
    pub async fn run(self: Arc<Self>, shutdown_tx: broadcast::Sender<()>) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(self.config.adapters.event_capacity.max(1));
        let started = self.start_adapters(tx).await;
        info!("{} adapters active", started);

        self.running.store(true, Ordering::SeqCst);
        *self.start_time.lock() = Some(Instant::now());

        let worker = self.worker.clone();
        let worker_shutdown = shutdown_tx.subscribe();
        let worker_handle = tokio::spawn(async move { worker.run(worker_shutdown).await });

        let publisher_handle = if self.config.live_status.enabled {
            let publisher = self.publisher.clone();
            let publisher_shutdown = shutdown_tx.subscribe();
            Some(tokio::spawn(async move { publisher.run(publisher_shutdown).await }))
        } else {
            None
        };

        let mut shutdown = shutdown_tx.subscribe();
        let mut flush_tick = interval(Duration::from_secs(self.config.collector.flush_check_secs.max(1)));

        loop {
            tokio::select! {
                Some(event) = rx.recv() => self.dispatch(event).await,
                _ = flush_tick.tick() => self.tick(Utc::now()),
                _ = shutdown.recv() => {
                    info!("Orchestrator shutting down...");
                    break;
                }
            }
        }

        self.shutdown().await;
        let _ = worker_handle.await;
        if let Some(handle) = publisher_handle {
            let _ = handle.await;
        }
        Ok(())
    }

    async fn dispatch(self: &Arc<Self>, event: AdapterEvent) {
        if let AdapterEvent::ExecutionWindow { budget } = event {
            let this = self.clone();
            tokio::spawn(async move {
                this.on_execution_window(budget).await;
            });
            return;
        }

        if let Err(e) = self.handle_event(event).await {
            if e.is_benign() {
                debug!("Ignored event: {}", e);
            } else {
                warn!("Event handling failed: {}", e);
            }
        }
    }

    /// Apply one adapter event
    pub async fn handle_event(&self, event: AdapterEvent) -> Result<()> {
        match event {
            AdapterEvent::Region {
                region_id,
                transition,
                at,
            } => self.on_region(&region_id, transition, at),
            AdapterEvent::Sample(sample) => self.on_sample(sample),
            AdapterEvent::ExecutionWindow { budget } => {
                self.on_execution_window(budget).await;
                Ok(())
            }
            AdapterEvent::Foreground(foreground) => {
                self.scheduler.set_foreground(foreground);
                Ok(())
            }
            AdapterEvent::Unavailable { adapter, reason } => {
                self.degrade(adapter, &reason);
                Ok(())
            }
        }
    }

    fn on_region(&self, region_id: &str, transition: RegionTransition, at: DateTime<Utc>) -> Result<()> {
        let (change, active) = {
            let mut sessions = self.sessions.lock();
            let change = sessions.handle(region_id, transition, at)?;
            (change, sessions.active_kinds())
        };
        let Some(change) = change else {
            return Ok(());
        };

        self.persist_session(change.session());
        self.publisher.record_sessions(active);

        match change {
            SessionChange::Opened(session) => {
                self.events.publish_session_opened(session);
            }
            SessionChange::Closed(session) => {
                let ingested = match session.to_sample(&self.config.device_id) {
                    Some(sample) => self.collector.ingest(sample).map(|_| ()),
                    None => Ok(()),
                };
                self.events.publish_session_closed(session);
                self.refresh_sync_status();
                ingested?;
            }
        }
        Ok(())
    }

    fn on_sample(&self, sample: HealthSample) -> Result<()> {
        self.collector.ingest(sample.clone())?;
        self.publisher.record_sample(&sample);
        self.events.publish_sample(sample);
        self.refresh_sync_status();
        Ok(())
    }

    fn degrade(&self, adapter: AdapterKind, reason: &str) {
        if self.adapters.mark_degraded(adapter, reason) {
            self.publisher.record_capabilities(self.adapters.degraded_capabilities());
        }
    }

    /// Host granted a background window of `budget`
    pub async fn on_execution_window(&self, budget: Duration) -> WindowReport {
        let report = self.scheduler.on_execution_window(ExecutionBudget::new(budget)).await;
        self.refresh_sync_status();
        report
    }

    /// Window at an explicit wall-clock time
    pub async fn run_window_at(&self, now: DateTime<Utc>, budget: Duration) -> WindowReport {
        let report = self.scheduler.run_window(now, ExecutionBudget::new(budget)).await;
        self.refresh_sync_status();
        report
    }

    /// Periodic housekeeping: age-based flushes and status refresh
    pub fn tick(&self, now: DateTime<Utc>) {
        match self.collector.flush_stale(now) {
            Ok(ids) if !ids.is_empty() => debug!("Flushed {} stale buffers", ids.len()),
            Ok(_) => {}
            Err(e) => warn!("Stale flush failed: {}", e),
        }
        self.refresh_sync_status();
    }

    /// Register the push token once; returns `false` when it was already sent
    pub async fn register_push_token(&self, token: &str) -> Result<bool> {
        if let Some(store) = &self.store {
            if store.get_setting(PUSH_TOKEN_KEY)?.as_deref() == Some(token) {
                debug!("Push token unchanged, not re-registering");
                return Ok(false);
            }
        }

        self.worker
            .client()
            .register_push_token(&self.config.device_id, token)
            .await?;

        if let Some(store) = &self.store {
            store.set_setting(PUSH_TOKEN_KEY, token)?;
        }
        Ok(true)
    }

    pub fn status(&self) -> SystemState {
        let stats = self.collector.stats();
        SystemState {
            running: self.running.load(Ordering::SeqCst),
            adapters_active: self.adapters.active_count(),
            degraded_capabilities: self.adapters.degraded_capabilities(),
            open_sessions: self.sessions.lock().active_kinds(),
            pending_batches: self.queue.pending_count(),
            failed_batches: self.queue.failed_count(),
            sync_degraded: self.queue.sync_degraded(),
            samples_ingested: stats.ingested,
            samples_rejected: stats.rejected,
            next_task_due: self.scheduler.next_due_at(),
            uptime_seconds: self.uptime(),
        }
    }

    pub fn uptime(&self) -> u64 {
        self.start_time.lock().map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    async fn shutdown(&self) {
        self.adapters.stop_all().await;
        match self.collector.flush_all(FlushReason::Shutdown) {
            Ok(ids) => info!("Flushed {} buffers on shutdown, {} batches unsent", ids.len(), self.queue.pending_count()),
            Err(e) => warn!("Shutdown flush failed: {}", e),
        }
        self.running.store(false, Ordering::SeqCst);
    }

    fn refresh_sync_status(&self) {
        self.publisher
            .record_sync(self.queue.pending_count(), self.queue.sync_degraded());
    }

    fn persist_session(&self, session: &ActivitySession) {
        if let Some(store) = &self.store {
            let saved = if session.is_open() {
                store.save_session(session)
            } else {
                store.delete_session(&session.id)
            };
            if let Err(e) = saved {
                warn!("Failed to persist session {}: {}", session.id, e);
                self.events.publish_error(&e.to_string());
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("running", &self.running.load(Ordering::SeqCst))
            .field("queue_len", &self.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{Channel, SampleType, SimulatedHistory, SimulatedSource};
    use crate::core::RunOutcome;
    use crate::error::OrchestratorError;
    use crate::geofence::SessionKind;
    use crate::streaming::PublishResult;
    use crate::testing::{MockEndpoint, RecordingSurface};

    fn config() -> Config {
        let mut config = Config::default();
        config.database.enabled = false;
        config.device_id = "dev-1".into();
        config
    }

    struct Harness {
        orchestrator: Arc<Orchestrator>,
        endpoint: Arc<MockEndpoint>,
        surface: Arc<RecordingSurface>,
    }

    async fn harness_with(builder: impl FnOnce(OrchestratorBuilder) -> OrchestratorBuilder) -> Harness {
        let endpoint = Arc::new(MockEndpoint::new());
        let surface = Arc::new(RecordingSurface::new(true));
        let base = Orchestrator::builder(config())
            .upload_client(endpoint.clone())
            .display(surface.clone())
            .database(Arc::new(Database::open_in_memory().unwrap()));
        let orchestrator = Arc::new(builder(base).build().await.unwrap());
        Harness {
            orchestrator,
            endpoint,
            surface,
        }
    }

    async fn harness() -> Harness {
        harness_with(|b| b).await
    }

    fn region(id: &str, transition: RegionTransition, at: DateTime<Utc>) -> AdapterEvent {
        AdapterEvent::Region {
            region_id: id.to_string(),
            transition,
            at,
        }
    }

    #[tokio::test]
    async fn test_gym_visit_becomes_uploaded_workout() {
        let h = harness().await;
        let o = &h.orchestrator;
        let t0 = Utc::now();

        o.handle_event(region("gym", RegionTransition::Enter, t0)).await.unwrap();
        assert_eq!(o.status().open_sessions, vec![SessionKind::Workout]);
        assert_eq!(o.publisher().publish_once().await, PublishResult::Published);
        assert_eq!(h.surface.pushed()[0].active_sessions, vec![SessionKind::Workout]);

        o.handle_event(region("gym", RegionTransition::Exit, t0 + chrono::Duration::seconds(1800)))
            .await
            .unwrap();
        assert!(o.status().open_sessions.is_empty());
        assert_eq!(o.collector().buffered(Channel::Health), 1);

        let ids = o.collector().flush_all(FlushReason::Scheduled).unwrap();
        let batch = o.queue().get(ids[0]).unwrap();
        assert_eq!(batch.samples[0].sample_type, SampleType::WorkoutSession);
        assert_eq!(batch.samples[0].value, 1800.0);

        let report = o.run_window_at(Utc::now() + chrono::Duration::seconds(2), Duration::from_secs(30)).await;
        assert_eq!(report.outcome(UPLOAD_TASK_ID), Some(&RunOutcome::Completed));
        assert_eq!(h.endpoint.records(), 1);
        assert!(o.queue().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_region_is_ignored() {
        let h = harness().await;
        let err = h
            .orchestrator
            .handle_event(region("office", RegionTransition::Enter, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidRegionEvent(_)));
        assert!(h.orchestrator.status().open_sessions.is_empty());
    }

    #[tokio::test]
    async fn test_denied_location_leaves_rest_running() {
        let h = harness_with(|b| {
            b.source(Box::new(
                SimulatedSource::location("gps", "dev-1", RegionTable::default(), 1.0).with_permission_denied(),
            ))
            .source(Box::new(SimulatedSource::motion("watch", "dev-1", 50.0)))
        })
        .await;
        let o = &h.orchestrator;

        let (tx, mut rx) = mpsc::channel(64);
        assert_eq!(o.start_adapters(tx).await, 1);
        assert_eq!(o.status().degraded_capabilities, vec![AdapterKind::Location]);
        assert_eq!(o.publisher().snapshot().degraded_capabilities, vec![AdapterKind::Location]);

        for _ in 0..4 {
            let event = rx.recv().await.unwrap();
            o.handle_event(event).await.unwrap();
        }
        assert!(o.status().samples_ingested >= 4);
        o.adapters().stop_all().await;
    }

    #[tokio::test]
    async fn test_revoked_capability_is_reported() {
        let h = harness().await;
        let o = &h.orchestrator;
        o.handle_event(AdapterEvent::Unavailable {
            adapter: AdapterKind::HealthStore,
            reason: "authorization revoked".into(),
        })
        .await
        .unwrap();
        assert_eq!(o.status().degraded_capabilities, vec![AdapterKind::HealthStore]);
    }

    #[tokio::test]
    async fn test_window_pulls_history_then_uploads() {
        let history = Arc::new(SimulatedHistory::new("health-store", AdapterKind::HealthStore));
        let now = Utc::now();
        history.push((0..120).map(|i| HealthSample::new(SampleType::HeartRate, 60.0 + (i % 20) as f64, now, "hk", "dev-1")));

        let h = harness_with(|b| b.anchored_source(TaskKind::HealthSync, history.clone())).await;
        let o = &h.orchestrator;

        let report = o.run_window_at(Utc::now() + chrono::Duration::seconds(2), Duration::from_secs(30)).await;
        assert_eq!(report.ran(), vec!["health_sync:health-store", UPLOAD_TASK_ID]);

        // 100 by size limit, 20 flushed by the upload task
        assert_eq!(h.endpoint.records(), 2);
        assert_eq!(o.status().samples_ingested, 120);
        assert_eq!(o.status().pending_batches, 0);
    }

    #[tokio::test]
    async fn test_push_token_registered_once() {
        let h = harness().await;
        let o = &h.orchestrator;

        assert!(o.register_push_token("abc").await.unwrap());
        assert!(!o.register_push_token("abc").await.unwrap());
        assert!(o.register_push_token("def").await.unwrap());
        assert_eq!(h.endpoint.push_tokens(), vec!["abc".to_string(), "def".to_string()]);
    }

    #[tokio::test]
    async fn test_unsent_batches_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.database.enabled = true;
        config.database.path = dir.path().join("vitalsync.db");

        {
            let o = Orchestrator::builder(config.clone())
                .upload_client(Arc::new(MockEndpoint::new()))
                .display(Arc::new(RecordingSurface::new(false)))
                .build()
                .await
                .unwrap();
            o.handle_event(region("home", RegionTransition::Enter, Utc::now())).await.unwrap();
            for bpm in [61.0, 64.0, 66.0] {
                let sample = HealthSample::new(SampleType::HeartRate, bpm, Utc::now(), "watch", "dev-1");
                o.handle_event(AdapterEvent::Sample(sample)).await.unwrap();
            }
            o.collector().flush_all(FlushReason::Shutdown).unwrap();
            assert_eq!(o.queue().len(), 1);
        }

        let endpoint = Arc::new(MockEndpoint::new());
        let o = Orchestrator::builder(config)
            .upload_client(endpoint.clone())
            .display(Arc::new(RecordingSurface::new(false)))
            .build()
            .await
            .unwrap();
        assert_eq!(o.queue().len(), 1);
        assert_eq!(o.status().open_sessions, vec![SessionKind::Sleep]);

        o.run_window_at(Utc::now() + chrono::Duration::seconds(2), Duration::from_secs(30)).await;
        assert_eq!(endpoint.records(), 1);
    }

    #[tokio::test]
    async fn test_run_loop_streams_samples_to_endpoint() {
        let endpoint = Arc::new(MockEndpoint::new());
        let mut config = config();
        config.collector.max_batch_samples = 10;

        let o = Arc::new(
            Orchestrator::builder(config)
                .upload_client(endpoint.clone())
                .display(Arc::new(RecordingSurface::new(false)))
                .database(Arc::new(Database::open_in_memory().unwrap()))
                .source(Box::new(SimulatedSource::motion("watch", "dev-1", 200.0)))
                .build()
                .await
                .unwrap(),
        );

        let (shutdown_tx, _) = broadcast::channel(4);
        let handle = tokio::spawn(o.clone().run(shutdown_tx.clone()));

        for _ in 0..300 {
            if endpoint.records() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(endpoint.records() > 0);
        assert!(o.status().running);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert!(!o.status().running);
    }

    #[tokio::test]
    async fn test_home_stay_over_a_day_still_yields_sleep_sample() {
        let h = harness().await;
        let o = &h.orchestrator;
        let mut closed = o.events().subscribe_events();
        let t0 = Utc::now();

        o.handle_event(region("home", RegionTransition::Enter, t0)).await.unwrap();
        o.handle_event(region("home", RegionTransition::Exit, t0 + chrono::Duration::hours(30)))
            .await
            .unwrap();

        assert!(o.status().open_sessions.is_empty());
        assert_eq!(o.collector().buffered(Channel::Health), 1);
        assert_eq!(o.status().samples_rejected, 0);

        let ids = o.collector().flush_all(FlushReason::Scheduled).unwrap();
        let sample = &o.queue().get(ids[0]).unwrap().samples[0];
        assert_eq!(sample.sample_type, SampleType::SleepSession);
        assert_eq!(sample.value, 30.0 * 3600.0);

        let mut saw_close = false;
        while let Ok(event) = closed.try_recv() {
            if matches!(event.payload, crate::core::EventPayload::SessionClosed(_)) {
                saw_close = true;
            }
        }
        assert!(saw_close);
    }

    #[tokio::test]
    async fn test_rejected_sample_stays_out_of_live_status() {
        let h = harness().await;
        let o = &h.orchestrator;
        let mut samples = o.events().subscribe_samples();

        let bogus = HealthSample::new(SampleType::HeartRate, 400.0, Utc::now(), "watch", "dev-1");
        let err = o.handle_event(AdapterEvent::Sample(bogus)).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidSample(_)));
        assert_eq!(o.publisher().snapshot().heart_rate, None);
        assert!(samples.try_recv().is_err());

        let steps = HealthSample::new(SampleType::StepCount, 250_000.0, Utc::now(), "watch", "dev-1");
        assert!(o.handle_event(AdapterEvent::Sample(steps)).await.is_err());
        assert_eq!(o.publisher().snapshot().steps, 0);

        let good = HealthSample::new(SampleType::HeartRate, 71.0, Utc::now(), "watch", "dev-1");
        o.handle_event(AdapterEvent::Sample(good)).await.unwrap();
        assert_eq!(o.publisher().snapshot().heart_rate, Some(71.0));
        assert_eq!(o.status().samples_rejected, 2);
    }

    #[tokio::test]
    async fn test_closed_session_leaves_store() {
        let store = Arc::new(Database::open_in_memory().unwrap());
        let o = Orchestrator::builder(config())
            .upload_client(Arc::new(MockEndpoint::new()))
            .display(Arc::new(RecordingSurface::new(false)))
            .database(store.clone())
            .build()
            .await
            .unwrap();
        let t0 = Utc::now();

        o.handle_event(region("gym", RegionTransition::Enter, t0)).await.unwrap();
        assert_eq!(store.load_open_sessions().unwrap().len(), 1);

        o.handle_event(region("gym", RegionTransition::Exit, t0 + chrono::Duration::minutes(45)))
            .await
            .unwrap();
        assert!(store.load_open_sessions().unwrap().is_empty());
        assert_eq!(store.get_stats().unwrap().session_count, 0);
    }
}
