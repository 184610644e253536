// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Task scheduler for host-granted execution windows
//!
//! Tasks only run inside a window handed over by the host. Due tasks run in
//! ascending `next_run_at` order (ties by id), one at a time, each on its own
//! tokio task so a panic stays inside that task. Jobs cooperate with the
//! window deadline through [`ExecutionBudget::should_yield`] and hand back a
//! checkpoint token when they stop early.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::EventBus;
use crate::db::Database;
use crate::error::{OrchestratorError, Result};

/// Soft deadline for one execution window
#[derive(Debug, Clone)]
pub struct ExecutionBudget {
    deadline: Instant,
    foreground: Arc<AtomicBool>,
    interruptible: bool,
}

impl ExecutionBudget {
    pub fn new(budget: Duration) -> Self {
        Self::until(Instant::now() + budget)
    }

    pub fn until(deadline: Instant) -> Self {
        Self {
            deadline,
            foreground: Arc::new(AtomicBool::new(false)),
            interruptible: false,
        }
    }

    /// Same deadline, bound to the scheduler's foreground flag
    fn for_task(&self, background_only: bool, foreground: &Arc<AtomicBool>) -> Self {
        Self {
            deadline: self.deadline,
            foreground: foreground.clone(),
            interruptible: background_only,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Host resumed foreground and this task only runs in background
    pub fn cancelled(&self) -> bool {
        self.interruptible && self.foreground.load(Ordering::SeqCst)
    }

    /// Jobs check this between resumable steps
    pub fn should_yield(&self) -> bool {
        self.expired() || self.cancelled()
    }
}

/// What a job reports back to the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Done,
    /// Stopped early; the token is handed back on the next run
    Checkpoint(String),
}

/// Input for one job run
#[derive(Debug, Clone)]
pub struct JobContext {
    pub task_id: String,
    pub budget: ExecutionBudget,
    /// Token from the previous run, if it checkpointed
    pub checkpoint: Option<String>,
}

/// Unit of recurring work. Steps must be resumable and idempotent.
#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self, ctx: JobContext) -> Result<RunStatus>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    HealthSync,
    LocationSync,
    DataUpload,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::HealthSync => "health_sync",
            TaskKind::LocationSync => "location_sync",
            TaskKind::DataUpload => "data_upload",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "health_sync" => Some(TaskKind::HealthSync),
            "location_sync" => Some(TaskKind::LocationSync),
            "data_upload" => Some(TaskKind::DataUpload),
            _ => None,
        }
    }

    /// Periodic polling; stops when the host resumes foreground
    pub fn is_polling(&self) -> bool {
        matches!(self, TaskKind::HealthSync | TaskKind::LocationSync)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResult {
    NeverRun,
    Success,
    Failure,
}

impl TaskResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskResult::NeverRun => "never_run",
            TaskResult::Success => "success",
            TaskResult::Failure => "failure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "never_run" => Some(TaskResult::NeverRun),
            "success" => Some(TaskResult::Success),
            "failure" => Some(TaskResult::Failure),
            _ => None,
        }
    }
}

/// Registry entry owned by the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub kind: TaskKind,
    pub interval_seconds: u64,
    pub next_run_at: DateTime<Utc>,
    pub last_result: TaskResult,
    pub checkpoint: Option<String>,
    pub background_only: bool,
}

impl ScheduledTask {
    pub fn new(id: &str, kind: TaskKind, interval_seconds: u64, first_run_at: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            kind,
            interval_seconds,
            next_run_at: first_run_at,
            last_result: TaskResult::NeverRun,
            checkpoint: None,
            background_only: kind.is_polling(),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_run_at <= now
    }

    /// `now + interval`, never moving backwards
    fn reschedule(&mut self, now: DateTime<Utc>) {
        let interval = chrono::Duration::seconds(self.interval_seconds.min(i64::MAX as u64 / 1000) as i64);
        self.next_run_at = self.next_run_at.max(now + interval);
    }

    fn apply(&mut self, now: DateTime<Utc>, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Completed => {
                self.last_result = TaskResult::Success;
                self.checkpoint = None;
                self.reschedule(now);
            }
            RunOutcome::Checkpointed(token) => {
                // Stays due so the next window resumes it
                self.checkpoint = Some(token.clone());
            }
            RunOutcome::Failed(_) => {
                // Keep the checkpoint so a retry does not redo finished steps
                self.last_result = TaskResult::Failure;
                self.reschedule(now);
            }
        }
    }
}

/// Outcome of one task run inside a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Checkpointed(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRun {
    pub task_id: String,
    pub outcome: RunOutcome,
}

/// Summary of one execution window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowReport {
    pub runs: Vec<TaskRun>,
    /// Already running in another window
    pub skipped: Vec<String>,
    /// Left for the next window (budget expired or foreground)
    pub deferred: Vec<String>,
}

impl WindowReport {
    pub fn ran(&self) -> Vec<&str> {
        self.runs.iter().map(|r| r.task_id.as_str()).collect()
    }

    pub fn outcome(&self, task_id: &str) -> Option<&RunOutcome> {
        self.runs.iter().find(|r| r.task_id == task_id).map(|r| &r.outcome)
    }
}

struct TaskEntry {
    task: ScheduledTask,
    job: Arc<dyn Job>,
    in_flight: bool,
}

type Registry = Arc<Mutex<BTreeMap<String, TaskEntry>>>;

pub struct Scheduler {
    entries: Registry,
    foreground: Arc<AtomicBool>,
    store: Option<Arc<Database>>,
    events: Option<Arc<EventBus>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(BTreeMap::new())),
            foreground: Arc::new(AtomicBool::new(false)),
            store: None,
            events: None,
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

    /// Add a task; persisted timing from an earlier run wins over `task.next_run_at`
    pub fn register(&self, mut task: ScheduledTask, job: Arc<dyn Job>) -> Result<()> {
        if let Some(store) = &self.store {
            if let Some(saved) = store.load_task(&task.id)? {
                task.next_run_at = task.next_run_at.max(saved.next_run_at);
                task.last_result = saved.last_result;
                task.checkpoint = saved.checkpoint;
                debug!("Restored task '{}' due at {}", task.id, task.next_run_at);
            }
            store.save_task(&task)?;
        }

        let mut entries = self.entries.lock();
        match entries.get_mut(&task.id) {
            Some(existing) => {
                warn!("Task '{}' registered twice, replacing its job", task.id);
                task.next_run_at = task.next_run_at.max(existing.task.next_run_at);
                existing.task = task;
                existing.job = job;
            }
            None => {
                info!("Registered task '{}' every {}s", task.id, task.interval_seconds);
                entries.insert(
                    task.id.clone(),
                    TaskEntry {
                        task,
                        job,
                        in_flight: false,
                    },
                );
            }
        }
        Ok(())
    }

    pub fn task(&self, id: &str) -> Option<ScheduledTask> {
        self.entries.lock().get(id).map(|e| e.task.clone())
    }

    pub fn tasks(&self) -> Vec<ScheduledTask> {
        self.entries.lock().values().map(|e| e.task.clone()).collect()
    }

    /// Earliest `next_run_at`; hosts use it to request the next window
    pub fn next_due_at(&self) -> Option<DateTime<Utc>> {
        self.entries.lock().values().map(|e| e.task.next_run_at).min()
    }

    /// Host moved the app to the foreground (`true`) or background
    pub fn set_foreground(&self, foreground: bool) {
        self.foreground.store(foreground, Ordering::SeqCst);
        debug!("Scheduler foreground = {}", foreground);
    }

    pub fn is_foreground(&self) -> bool {
        self.foreground.load(Ordering::SeqCst)
    }

    /// Host callback: run everything due now within `budget`
    pub async fn on_execution_window(&self, budget: ExecutionBudget) -> WindowReport {
        self.run_window(Utc::now(), budget).await
    }

    /// Run every task due at `now`, in order, until the budget runs out
    pub async fn run_window(&self, now: DateTime<Utc>, budget: ExecutionBudget) -> WindowReport {
        let mut report = WindowReport::default();

        let due: Vec<String> = {
            let entries = self.entries.lock();
            let mut due: Vec<_> = entries
                .values()
                .filter(|e| e.task.is_due(now))
                .map(|e| (e.task.next_run_at, e.task.id.clone()))
                .collect();
            due.sort();
            due.into_iter().map(|(_, id)| id).collect()
        };

        for id in due {
            if budget.expired() {
                info!("{}; resuming next window", OrchestratorError::SchedulingOverrun { task: id.clone() });
                report.deferred.push(id);
                continue;
            }

            let claim = {
                let mut entries = self.entries.lock();
                match entries.get_mut(&id) {
                    Some(entry) if entry.in_flight => {
                        debug!("Task '{}' already running, skipping", id);
                        report.skipped.push(id.clone());
                        None
                    }
                    Some(entry) if entry.task.background_only && self.is_foreground() => {
                        debug!("Task '{}' is background-only, deferring", id);
                        report.deferred.push(id.clone());
                        None
                    }
                    Some(entry) if entry.task.is_due(now) => {
                        entry.in_flight = true;
                        Some((entry.job.clone(), entry.task.checkpoint.clone(), entry.task.background_only))
                    }
                    _ => None,
                }
            };
            let Some((job, checkpoint, background_only)) = claim else {
                continue;
            };

            let ctx = JobContext {
                task_id: id.clone(),
                budget: budget.for_task(background_only, &self.foreground),
                checkpoint,
            };
            let handle = tokio::spawn(execute(
                job,
                ctx,
                now,
                self.entries.clone(),
                self.store.clone(),
                self.events.clone(),
            ));

            let outcome = match handle.await {
                Ok(outcome) => outcome,
                // Runtime shutting down; the spawned task never recorded anything
                Err(e) => {
                    let outcome = RunOutcome::Failed(e.to_string());
                    finish(&self.entries, self.store.as_deref(), &id, now, &outcome);
                    outcome
                }
            };
            report.runs.push(TaskRun { task_id: id, outcome });
        }

        report
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs on its own tokio task; records the outcome even if the window is dropped
async fn execute(
    job: Arc<dyn Job>,
    ctx: JobContext,
    now: DateTime<Utc>,
    entries: Registry,
    store: Option<Arc<Database>>,
    events: Option<Arc<EventBus>>,
) -> RunOutcome {
    let id = ctx.task_id.clone();
    debug!("Running task '{}' ({:?} left)", id, ctx.budget.remaining());

    let outcome = match AssertUnwindSafe(job.run(ctx)).catch_unwind().await {
        Ok(Ok(RunStatus::Done)) => RunOutcome::Completed,
        Ok(Ok(RunStatus::Checkpoint(token))) => {
            info!("Task '{}' checkpointed at '{}'", id, token);
            RunOutcome::Checkpointed(token)
        }
        Ok(Err(e)) => {
            warn!("Task '{}' failed: {}", id, e);
            RunOutcome::Failed(e.to_string())
        }
        Err(_) => {
            let e = OrchestratorError::TaskPanicked { task: id.clone() };
            warn!("{}", e);
            RunOutcome::Failed(e.to_string())
        }
    };

    finish(&entries, store.as_deref(), &id, now, &outcome);
    if let Some(events) = &events {
        events.publish_task_finished(&id, &outcome);
    }
    outcome
}

fn finish(entries: &Mutex<BTreeMap<String, TaskEntry>>, store: Option<&Database>, id: &str, now: DateTime<Utc>, outcome: &RunOutcome) {
    let mut entries = entries.lock();
    let Some(entry) = entries.get_mut(id) else {
        return;
    };
    entry.in_flight = false;
    entry.task.apply(now, outcome);

    if let Some(store) = store {
        if let Err(e) = store.save_task(&entry.task) {
            warn!("Failed to persist task '{}': {}", id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    /// Records its name into a shared log
    struct LogJob {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl Job for LogJob {
        async fn run(&self, _ctx: JobContext) -> Result<RunStatus> {
            self.log.lock().push(self.name);
            if self.fail {
                return Err(OrchestratorError::TransientIo("offline".into()));
            }
            Ok(RunStatus::Done)
        }
    }

    struct PanicJob;

    #[async_trait]
    impl Job for PanicJob {
        async fn run(&self, _ctx: JobContext) -> Result<RunStatus> {
            panic!("boom");
        }
    }

    /// Processes `steps` units, yielding when the budget says so
    struct SteppedJob {
        steps: usize,
        done: Arc<Mutex<Vec<usize>>>,
        per_step: Duration,
    }

    #[async_trait]
    impl Job for SteppedJob {
        async fn run(&self, ctx: JobContext) -> Result<RunStatus> {
            let start = ctx.checkpoint.as_deref().and_then(|c| c.parse().ok()).unwrap_or(0);
            for step in start..self.steps {
                if ctx.budget.should_yield() {
                    return Ok(RunStatus::Checkpoint(step.to_string()));
                }
                tokio::time::sleep(self.per_step).await;
                self.done.lock().push(step);
            }
            Ok(RunStatus::Done)
        }
    }

    /// Tracks how many copies of itself run at once
    struct ConcurrencyProbe {
        active: AtomicUsize,
        max_seen: AtomicUsize,
    }

    #[async_trait]
    impl Job for ConcurrencyProbe {
        async fn run(&self, _ctx: JobContext) -> Result<RunStatus> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(RunStatus::Done)
        }
    }

    fn log_job(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>, fail: bool) -> Arc<dyn Job> {
        Arc::new(LogJob { name, log: log.clone(), fail })
    }

    #[tokio::test]
    async fn test_runs_due_tasks_in_order_with_id_tiebreak() {
        let scheduler = Scheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        scheduler.register(ScheduledTask::new("upload", TaskKind::DataUpload, 60, t(10)), log_job("upload", &log, false)).unwrap();
        scheduler.register(ScheduledTask::new("location", TaskKind::LocationSync, 60, t(0)), log_job("location", &log, false)).unwrap();
        scheduler.register(ScheduledTask::new("health", TaskKind::HealthSync, 60, t(0)), log_job("health", &log, false)).unwrap();
        scheduler.register(ScheduledTask::new("later", TaskKind::HealthSync, 60, t(500)), log_job("later", &log, false)).unwrap();

        let report = scheduler.run_window(t(20), ExecutionBudget::new(Duration::from_secs(30))).await;
        assert_eq!(*log.lock(), vec!["health", "location", "upload"]);
        assert_eq!(report.ran(), vec!["health", "location", "upload"]);
        assert_eq!(scheduler.task("later").unwrap().last_result, TaskResult::NeverRun);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_and_not_shortened() {
        let scheduler = Scheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        scheduler.register(ScheduledTask::new("a", TaskKind::HealthSync, 900, t(0)), log_job("a", &log, true)).unwrap();
        scheduler.register(ScheduledTask::new("b", TaskKind::HealthSync, 900, t(0)), log_job("b", &log, false)).unwrap();
        scheduler.register(ScheduledTask::new("c", TaskKind::DataUpload, 900, t(0)), Arc::new(PanicJob)).unwrap();

        let report = scheduler.run_window(t(100), ExecutionBudget::new(Duration::from_secs(30))).await;
        assert_eq!(*log.lock(), vec!["a", "b"]);
        assert!(matches!(report.outcome("a"), Some(RunOutcome::Failed(_))));
        assert_eq!(report.outcome("b"), Some(&RunOutcome::Completed));
        assert!(matches!(report.outcome("c"), Some(RunOutcome::Failed(m)) if m.contains("panicked")));

        let a = scheduler.task("a").unwrap();
        assert_eq!(a.last_result, TaskResult::Failure);
        assert_eq!(a.next_run_at, t(1000));
        assert_eq!(scheduler.task("c").unwrap().next_run_at, t(1000));
    }

    #[tokio::test]
    async fn test_next_run_is_monotonic() {
        let scheduler = Scheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        scheduler.register(ScheduledTask::new("a", TaskKind::HealthSync, 60, t(0)), log_job("a", &log, false)).unwrap();

        let mut previous = scheduler.task("a").unwrap().next_run_at;
        for now in [t(0), t(30), t(60), t(61), t(200), t(150)] {
            scheduler.run_window(now, ExecutionBudget::new(Duration::from_secs(5))).await;
            let next = scheduler.task("a").unwrap().next_run_at;
            assert!(next >= previous);
            previous = next;
        }
        assert_eq!(previous, t(260));
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkpoint_resumes_without_redoing_work() {
        let scheduler = Scheduler::new();
        let done = Arc::new(Mutex::new(Vec::new()));
        let job = Arc::new(SteppedJob {
            steps: 10,
            done: done.clone(),
            per_step: Duration::from_secs(1),
        });
        scheduler.register(ScheduledTask::new("health", TaskKind::HealthSync, 900, t(0)), job).unwrap();

        let first = scheduler.run_window(t(0), ExecutionBudget::new(Duration::from_millis(3500))).await;
        assert_eq!(first.outcome("health"), Some(&RunOutcome::Checkpointed("4".into())));
        let task = scheduler.task("health").unwrap();
        assert_eq!(task.checkpoint.as_deref(), Some("4"));
        assert_eq!(task.next_run_at, t(0), "checkpointed task stays due");

        let second = scheduler.run_window(t(5), ExecutionBudget::new(Duration::from_secs(60))).await;
        assert_eq!(second.outcome("health"), Some(&RunOutcome::Completed));
        assert_eq!(*done.lock(), (0..10).collect::<Vec<_>>());

        let task = scheduler.task("health").unwrap();
        assert_eq!(task.checkpoint, None);
        assert_eq!(task.next_run_at, t(905));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_budget_defers_remaining_tasks() {
        let scheduler = Scheduler::new();
        let done = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::new(Mutex::new(Vec::new()));
        scheduler
            .register(
                ScheduledTask::new("a", TaskKind::DataUpload, 60, t(0)),
                Arc::new(SteppedJob { steps: 3, done: done.clone(), per_step: Duration::from_secs(2) }),
            )
            .unwrap();
        scheduler.register(ScheduledTask::new("b", TaskKind::DataUpload, 60, t(1)), log_job("b", &log, false)).unwrap();

        let report = scheduler.run_window(t(10), ExecutionBudget::new(Duration::from_secs(3))).await;
        assert!(matches!(report.outcome("a"), Some(RunOutcome::Checkpointed(_))));
        assert_eq!(report.deferred, vec!["b".to_string()]);
        assert!(log.lock().is_empty());
        assert!(scheduler.task("b").unwrap().is_due(t(10)));
    }

    #[tokio::test]
    async fn test_single_flight_across_overlapping_windows() {
        let scheduler = Arc::new(Scheduler::new());
        let probe = Arc::new(ConcurrencyProbe {
            active: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
        });
        scheduler.register(ScheduledTask::new("upload", TaskKind::DataUpload, 1, t(0)), probe.clone()).unwrap();

        let mut windows = Vec::new();
        for i in 0..8 {
            let scheduler = scheduler.clone();
            windows.push(tokio::spawn(async move {
                scheduler.run_window(t(i), ExecutionBudget::new(Duration::from_secs(5))).await
            }));
        }
        let mut ran = 0;
        for w in windows {
            ran += w.await.unwrap().runs.len();
        }

        assert_eq!(probe.max_seen.load(Ordering::SeqCst), 1);
        assert!(ran >= 1);
    }

    #[tokio::test]
    async fn test_foreground_defers_background_only_tasks() {
        let scheduler = Scheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        scheduler.register(ScheduledTask::new("health", TaskKind::HealthSync, 60, t(0)), log_job("health", &log, false)).unwrap();
        scheduler.register(ScheduledTask::new("upload", TaskKind::DataUpload, 60, t(0)), log_job("upload", &log, false)).unwrap();

        scheduler.set_foreground(true);
        let report = scheduler.run_window(t(0), ExecutionBudget::new(Duration::from_secs(5))).await;
        assert_eq!(report.ran(), vec!["upload"]);
        assert_eq!(report.deferred, vec!["health".to_string()]);

        scheduler.set_foreground(false);
        let report = scheduler.run_window(t(1), ExecutionBudget::new(Duration::from_secs(5))).await;
        assert_eq!(report.ran(), vec!["health"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreground_interrupts_running_polling_task() {
        let scheduler = Arc::new(Scheduler::new());
        let done = Arc::new(Mutex::new(Vec::new()));
        scheduler
            .register(
                ScheduledTask::new("health", TaskKind::HealthSync, 60, t(0)),
                Arc::new(SteppedJob { steps: 100, done: done.clone(), per_step: Duration::from_secs(1) }),
            )
            .unwrap();

        let window = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run_window(t(0), ExecutionBudget::new(Duration::from_secs(1000))).await }
        });
        tokio::time::sleep(Duration::from_millis(5500)).await;
        scheduler.set_foreground(true);

        let report = window.await.unwrap();
        assert!(matches!(report.outcome("health"), Some(RunOutcome::Checkpointed(_))));
        assert!(done.lock().len() < 100);
    }
}
