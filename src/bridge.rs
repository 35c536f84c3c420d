//! Request bridge client
//!
//! The bridge is the external system that originates prediction requests.
//! `RequestSource` is the seam the worker polls; production uses the HTTP
//! implementation below, tests substitute a deterministic fake. One poll is
//! one round-trip: the client queries unconsumed `PredictionRequested`
//! events past its cursor and never retries internally.

use crate::error::{Result, WorkerError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// One unit of work pulled from the bridge. Field names follow the
/// `PredictionRequested` event. Read-only to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEvent {
    #[serde(rename = "requestId")]
    pub request_id: u64,
    #[serde(rename = "modelId")]
    pub model_id: u64,
    /// Opaque payload, hex- or base64-encoded f32 little-endian bytes.
    #[serde(rename = "inputData")]
    pub input_data: String,
    /// Carried through unmodified; not interpreted by the pipeline.
    pub requestor: String,
}

#[async_trait]
pub trait RequestSource: Send + Sync {
    /// Query the bridge once. An empty vec means no new requests; transport
    /// failures surface as `SourceUnavailable` and the caller decides retry
    /// policy.
    async fn poll(&self) -> Result<Vec<RequestEvent>>;
}

/// HTTP bridge client with a "since last poll" cursor.
pub struct HttpRequestBridge {
    client: reqwest::Client,
    base_url: String,
    cursor: AtomicU64,
}

impl HttpRequestBridge {
    pub fn new(base_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| WorkerError::SourceUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cursor: AtomicU64::new(0),
        })
    }

    /// Highest requestId observed so far.
    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }
}

#[async_trait]
impl RequestSource for HttpRequestBridge {
    async fn poll(&self) -> Result<Vec<RequestEvent>> {
        let since = self.cursor.load(Ordering::Acquire);
        let url = format!("{}/requests?since={}", self.base_url, since);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| WorkerError::SourceUnavailable(format!("bridge query failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(WorkerError::SourceUnavailable(format!(
                "bridge returned HTTP {}",
                response.status()
            )));
        }

        let events: Vec<RequestEvent> = response.json().await.map_err(|e| {
            WorkerError::SourceUnavailable(format!("invalid bridge response: {}", e))
        })?;

        // The bridge polls a non-overlapping window, but redelivery is still
        // possible; the pipeline's dedup set is the real guard.
        if let Some(max_id) = events.iter().map(|e| e.request_id).max() {
            self.cursor.fetch_max(max_id, Ordering::AcqRel);
        }

        debug!(since, count = events.len(), "bridge poll completed");
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_event_wire_format() {
        let json = r#"{
            "requestId": 7,
            "modelId": 0,
            "inputData": "0xdeadbeef",
            "requestor": "0xAb5801a7D398351b8bE11C439e05C5B3259aeC9B"
        }"#;

        let event: RequestEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.request_id, 7);
        assert_eq!(event.model_id, 0);
        assert_eq!(event.input_data, "0xdeadbeef");
        assert!(event.requestor.starts_with("0x"));

        // Round-trips under the same field names
        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back["requestId"], 7);
        assert_eq!(back["inputData"], "0xdeadbeef");
    }
}
