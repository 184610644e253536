// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Upload client for the remote sync endpoints

use std::time::Duration;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::SyncBatch;
use crate::error::{OrchestratorError, Result};
use crate::geofence::Coordinate;

/// Server acknowledgement of an accepted batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadReceipt {
    /// The server had already seen this idempotency key
    pub duplicate: bool,
}

/// Seam between the sync worker and the network
#[async_trait]
pub trait UploadClient: Send + Sync {
    /// Deliver one batch. `TransientIo` is retried, `PermanentRejection` is not.
    async fn upload(&self, batch: &SyncBatch) -> Result<UploadReceipt>;

    /// One-shot registration of a push notification token
    async fn register_push_token(&self, device_id: &str, token: &str) -> Result<()>;
}

/// Wire form of a sample
#[derive(Debug, Serialize)]
struct WireSample<'a> {
    #[serde(rename = "type")]
    sample_type: &'a str,
    value: f64,
    unit: &'a str,
    timestamp: DateTime<Utc>,
    source: &'a str,
    device: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<Coordinate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchPayload<'a> {
    batch_id: String,
    samples: Vec<WireSample<'a>>,
    idempotency_key: String,
}

impl<'a> BatchPayload<'a> {
    fn from_batch(batch: &'a SyncBatch) -> Self {
        Self {
            batch_id: batch.id.to_string(),
            samples: batch
                .samples
                .iter()
                .map(|s| WireSample {
                    sample_type: s.sample_type.as_str(),
                    value: s.value,
                    unit: &s.unit,
                    timestamp: s.timestamp,
                    source: &s.source_id,
                    device: &s.device_id,
                    location: s.coordinate,
                })
                .collect(),
            idempotency_key: batch.idempotency_key(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SyncResponse {
    accepted: bool,
    #[serde(default)]
    duplicate: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PushTokenPayload<'a> {
    device_id: &'a str,
    token: &'a str,
}

/// reqwest-backed client
pub struct HttpUploadClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpUploadClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vitalsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// 4xx is permanent, everything else that is not 2xx is transient
fn classify_status(status: StatusCode, body: &str) -> OrchestratorError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body.chars().take(200).collect::<String>())
    };
    if status.is_client_error() {
        OrchestratorError::PermanentRejection(detail)
    } else {
        OrchestratorError::TransientIo(detail)
    }
}

#[async_trait]
impl UploadClient for HttpUploadClient {
    async fn upload(&self, batch: &SyncBatch) -> Result<UploadReceipt> {
        let url = self.url(batch.channel.endpoint_path());
        let payload = BatchPayload::from_batch(batch);

        debug!("POST {} batch={} samples={}", url, batch.id, batch.len());
        let response = self
            .http
            .post(&url)
            .header("Idempotency-Key", batch.idempotency_key())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        // A body we cannot read is treated like a dropped connection; the
        // idempotency key makes the resend harmless.
        let ack: SyncResponse = response
            .json()
            .await
            .map_err(|e| OrchestratorError::TransientIo(format!("unreadable ack: {}", e)))?;

        if !ack.accepted {
            return Err(OrchestratorError::PermanentRejection(format!(
                "batch {} not accepted",
                batch.id
            )));
        }
        Ok(UploadReceipt {
            duplicate: ack.duplicate,
        })
    }

    async fn register_push_token(&self, device_id: &str, token: &str) -> Result<()> {
        let url = self.url("/devices/push-token");
        let response = self
            .http
            .post(&url)
            .json(&PushTokenPayload { device_id, token })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        info!("Registered push token for {}", device_id);
        Ok(())
    }
}
