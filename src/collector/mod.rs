// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Data collector - validates samples and groups them into upload batches
//!
//! One buffer per upload channel. A buffer is swapped out under the lock and
//! handed to the sync queue after the lock is released, so ingestion never
//! waits on persistence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::adapters::{Channel, HealthSample};
use crate::config::CollectorConfig;
use crate::error::Result;
use crate::sync::{SyncBatch, SyncQueue};

/// Why a buffer was turned into a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    SizeLimit,
    MaxAge,
    Scheduled,
    Shutdown,
}

#[derive(Default)]
struct Buffer {
    samples: Vec<HealthSample>,
    /// Arrival time of the oldest buffered sample
    opened_at: Option<DateTime<Utc>>,
}

impl Buffer {
    fn detach(&mut self) -> Vec<HealthSample> {
        self.opened_at = None;
        std::mem::take(&mut self.samples)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectorStats {
    pub ingested: u64,
    pub rejected: u64,
    pub batches: u64,
    pub buffered: usize,
}

pub struct Collector {
    max_samples: usize,
    max_age: chrono::Duration,
    buffers: Mutex<HashMap<Channel, Buffer>>,
    queue: Arc<SyncQueue>,
    ingested: AtomicU64,
    rejected: AtomicU64,
    batches: AtomicU64,
}

impl Collector {
    pub fn new(config: &CollectorConfig, queue: Arc<SyncQueue>) -> Self {
        Self {
            max_samples: config.max_batch_samples.max(1),
            max_age: chrono::Duration::seconds(config.max_batch_age_secs.min(i64::MAX as u64) as i64),
            buffers: Mutex::new(HashMap::new()),
            queue,
            ingested: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            batches: AtomicU64::new(0),
        }
    }

    pub fn queue(&self) -> &Arc<SyncQueue> {
        &self.queue
    }

    /// Buffer a sample; returns the batch id when this sample filled a buffer
    pub fn ingest(&self, sample: HealthSample) -> Result<Option<Uuid>> {
        if let Err(e) = sample.validate() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            warn!("Dropping sample from {}: {}", sample.source_id, e);
            return Err(e);
        }

        let channel = sample.channel();
        let full = {
            let mut buffers = self.buffers.lock();
            let buffer = buffers.entry(channel).or_default();
            if buffer.samples.is_empty() {
                buffer.opened_at = Some(Utc::now());
            }
            buffer.samples.push(sample);
            self.ingested.fetch_add(1, Ordering::Relaxed);

            (buffer.samples.len() >= self.max_samples).then(|| buffer.detach())
        };

        match full {
            Some(samples) => self.hand_off(channel, samples, FlushReason::SizeLimit).map(Some),
            None => Ok(None),
        }
    }

    /// Turn one channel's buffer into a batch, if it holds anything
    pub fn flush(&self, channel: Channel, reason: FlushReason) -> Result<Option<Uuid>> {
        let samples = {
            let mut buffers = self.buffers.lock();
            match buffers.get_mut(&channel) {
                Some(buffer) if !buffer.samples.is_empty() => buffer.detach(),
                _ => return Ok(None),
            }
        };
        self.hand_off(channel, samples, reason).map(Some)
    }

    pub fn flush_all(&self, reason: FlushReason) -> Result<Vec<Uuid>> {
        let mut ids = Vec::new();
        for channel in Channel::ALL {
            if let Some(id) = self.flush(channel, reason)? {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Flush every buffer whose oldest sample arrived at least `max_age` before `now`
    pub fn flush_stale(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let stale: Vec<(Channel, Vec<HealthSample>)> = {
            let mut buffers = self.buffers.lock();
            buffers
                .iter_mut()
                .filter(|(_, b)| b.opened_at.map(|at| now - at >= self.max_age).unwrap_or(false))
                .map(|(channel, b)| (*channel, b.detach()))
                .collect()
        };

        let mut ids = Vec::new();
        for (channel, samples) in stale {
            ids.push(self.hand_off(channel, samples, FlushReason::MaxAge)?);
        }
        Ok(ids)
    }

    /// Samples waiting in a buffer
    pub fn buffered(&self, channel: Channel) -> usize {
        self.buffers.lock().get(&channel).map(|b| b.samples.len()).unwrap_or(0)
    }

    pub fn stats(&self) -> CollectorStats {
        CollectorStats {
            ingested: self.ingested.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            buffered: self.buffers.lock().values().map(|b| b.samples.len()).sum(),
        }
    }

    fn hand_off(&self, channel: Channel, samples: Vec<HealthSample>, reason: FlushReason) -> Result<Uuid> {
        let batch = SyncBatch::new(channel, samples, Utc::now());
        let id = batch.id;
        debug!("Flushing {} {:?} samples ({:?}) as batch {}", batch.len(), channel, reason, id);

        self.queue.enqueue(batch)?;
        self.batches.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }
}
