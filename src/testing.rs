// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Test doubles shared by unit tests

use std::collections::{HashSet, VecDeque};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{OrchestratorError, Result};
use crate::streaming::{DisplaySurface, LiveSnapshot};
use crate::sync::{SyncBatch, UploadClient, UploadReceipt};

/// Upload endpoint that tracks idempotency keys like the real server
#[derive(Default)]
pub struct MockEndpoint {
    script: Mutex<VecDeque<Result<()>>>,
    seen: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    push_tokens: Mutex<Vec<String>>,
}

impl MockEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Responses returned before falling back to acceptance
    pub fn script(&self, responses: Vec<Result<()>>) {
        self.script.lock().extend(responses);
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, key: &str) -> usize {
        self.calls.lock().iter().filter(|k| k.as_str() == key).count()
    }

    /// Distinct batches stored server-side
    pub fn records(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn push_tokens(&self) -> Vec<String> {
        self.push_tokens.lock().clone()
    }
}

#[async_trait]
impl UploadClient for MockEndpoint {
    async fn upload(&self, batch: &SyncBatch) -> Result<UploadReceipt> {
        let key = batch.idempotency_key();
        self.calls.lock().push(key.clone());

        let scripted = self.script.lock().pop_front();
        if let Some(response) = scripted {
            response?;
        }
        let duplicate = !self.seen.lock().insert(key);
        Ok(UploadReceipt { duplicate })
    }

    async fn register_push_token(&self, _device_id: &str, token: &str) -> Result<()> {
        self.push_tokens.lock().push(token.to_string());
        Ok(())
    }
}

/// Display surface that records every snapshot it receives
pub struct RecordingSurface {
    attached: Mutex<bool>,
    fail_next: Mutex<bool>,
    pushed: Mutex<Vec<LiveSnapshot>>,
}

impl RecordingSurface {
    pub fn new(attached: bool) -> Self {
        Self {
            attached: Mutex::new(attached),
            fail_next: Mutex::new(false),
            pushed: Mutex::new(Vec::new()),
        }
    }

    pub fn set_attached(&self, attached: bool) {
        *self.attached.lock() = attached;
    }

    pub fn fail_next(&self) {
        *self.fail_next.lock() = true;
    }

    pub fn pushed(&self) -> Vec<LiveSnapshot> {
        self.pushed.lock().clone()
    }
}

#[async_trait]
impl DisplaySurface for RecordingSurface {
    fn is_attached(&self) -> bool {
        *self.attached.lock()
    }

    async fn push(&self, snapshot: &LiveSnapshot) -> Result<()> {
        if std::mem::take(&mut *self.fail_next.lock()) {
            return Err(OrchestratorError::TransientIo("display went away".into()));
        }
        self.pushed.lock().push(snapshot.clone());
        Ok(())
    }
}
