//! Result validator client
//!
//! The validator is the external system that records prediction outcomes.
//! `ResultSink` is the one-call seam: submit an encoded result for a
//! requestId and get an ack back. Signing and address derivation are the
//! collaborator's concern; this client speaks plain HTTP.

use crate::error::{Result, WorkerError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize)]
struct PredictionSubmission<'a> {
    #[serde(rename = "requestId")]
    request_id: u64,
    provider: &'a str,
    #[serde(rename = "predictionData")]
    prediction_data: &'a str,
}

/// Ack body. The validator may include the transaction hash that recorded
/// the submission.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionAck {
    #[serde(rename = "txHash", default)]
    pub tx_hash: Option<String>,
}

#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Submit one encoded result. Called exactly once per result per cycle;
    /// a `Submission` error is reported upward and retried only through
    /// redelivery on a later poll.
    async fn submit(&self, request_id: u64, payload: &str) -> Result<()>;
}

/// HTTP validator client.
pub struct HttpResultValidator {
    client: reqwest::Client,
    base_url: String,
    provider: String,
}

impl HttpResultValidator {
    pub fn new(base_url: String, provider: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| WorkerError::Submission(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            provider,
        })
    }
}

#[async_trait]
impl ResultSink for HttpResultValidator {
    async fn submit(&self, request_id: u64, payload: &str) -> Result<()> {
        let url = format!("{}/predictions", self.base_url);
        let body = PredictionSubmission {
            request_id,
            provider: &self.provider,
            prediction_data: payload,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                WorkerError::Submission(format!("validator unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(WorkerError::Submission(format!(
                "validator rejected request {} with HTTP {}",
                request_id,
                response.status()
            )));
        }

        // Ack bodies are optional; an empty 2xx is still a confirmed ack.
        let ack: SubmissionAck = response.json().await.unwrap_or_default();
        match ack.tx_hash {
            Some(tx) => info!(request_id, tx_hash = %tx, "submission recorded"),
            None => debug!(request_id, "submission acknowledged"),
        }

        Ok(())
    }
}
