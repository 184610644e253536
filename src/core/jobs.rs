// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Built-in recurring jobs

use std::sync::Arc;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::scheduler::{Job, JobContext, RunStatus};
use crate::adapters::AnchoredSource;
use crate::collector::{Collector, FlushReason};
use crate::db::Database;
use crate::error::{OrchestratorError, Result};
use crate::sync::SyncWorker;

/// Pages an anchored source into the collector.
///
/// The anchor survives across runs (and restarts when a store is attached) so
/// each run only fetches what is new.
pub struct AnchoredSyncJob {
    source: Arc<dyn AnchoredSource>,
    collector: Arc<Collector>,
    page_size: usize,
    anchor: Mutex<Option<String>>,
    store: Option<Arc<Database>>,
}

impl AnchoredSyncJob {
    pub fn new(source: Arc<dyn AnchoredSource>, collector: Arc<Collector>, page_size: usize) -> Self {
        Self {
            source,
            collector,
            page_size: page_size.max(1),
            anchor: Mutex::new(None),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<Database>) -> Self {
        match store.get_setting(&self.setting_key()) {
            Ok(anchor) => *self.anchor.lock() = anchor,
            Err(e) => warn!("Could not load anchor for {}: {}", self.source.name(), e),
        }
        self.store = Some(store);
        self
    }

    pub fn anchor(&self) -> Option<String> {
        self.anchor.lock().clone()
    }

    fn setting_key(&self) -> String {
        format!("anchor.{}", self.source.name())
    }

    fn save_anchor(&self, anchor: &str) {
        *self.anchor.lock() = Some(anchor.to_string());
        if let Some(store) = &self.store {
            if let Err(e) = store.set_setting(&self.setting_key(), anchor) {
                warn!("Failed to persist anchor for {}: {}", self.source.name(), e);
            }
        }
    }
}

#[async_trait]
impl Job for AnchoredSyncJob {
    async fn run(&self, ctx: JobContext) -> Result<RunStatus> {
        let mut anchor = ctx
            .checkpoint
            .filter(|c| !c.is_empty())
            .or_else(|| self.anchor());
        let (mut ingested, mut rejected) = (0usize, 0usize);

        loop {
            if ctx.budget.should_yield() {
                debug!("{}: yielding after {} samples", ctx.task_id, ingested);
                return Ok(RunStatus::Checkpoint(anchor.unwrap_or_default()));
            }

            let page = self.source.fetch_page(anchor.as_deref(), self.page_size).await?;
            for sample in page.samples {
                match self.collector.ingest(sample) {
                    Ok(_) => ingested += 1,
                    Err(OrchestratorError::InvalidSample(_)) => rejected += 1,
                    Err(e) => return Err(e),
                }
            }
            if let Some(next) = page.next_anchor {
                self.save_anchor(&next);
                anchor = Some(next);
            }
            if !page.has_more {
                break;
            }
        }

        if ingested + rejected > 0 {
            info!(
                "{}: pulled {} samples from {} ({} rejected)",
                ctx.task_id,
                ingested,
                self.source.name(),
                rejected
            );
        }
        Ok(RunStatus::Done)
    }
}

/// Flushes the collector and drains the sync queue within the window
pub struct DataUploadJob {
    collector: Arc<Collector>,
    worker: Arc<SyncWorker>,
}

impl DataUploadJob {
    pub fn new(collector: Arc<Collector>, worker: Arc<SyncWorker>) -> Self {
        Self { collector, worker }
    }
}

#[async_trait]
impl Job for DataUploadJob {
    async fn run(&self, ctx: JobContext) -> Result<RunStatus> {
        let flushed = self.collector.flush_all(FlushReason::Scheduled)?;
        let report = self.worker.drain(Some(&ctx.budget)).await;

        debug!(
            "{}: flushed {} buffers, uploaded {}/{}",
            ctx.task_id,
            flushed.len(),
            report.succeeded,
            report.attempted
        );
        if report.interrupted {
            return Ok(RunStatus::Checkpoint(format!("uploaded:{}", report.succeeded)));
        }
        Ok(RunStatus::Done)
    }
}
