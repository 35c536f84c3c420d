//! Request processing pipeline
//!
//! Turns one poll cycle into zero or more submissions: poll -> decode ->
//! infer -> encode -> submit, isolating failures per request so one bad
//! request never aborts a batch. Dedup bookkeeping lives here: a requestId
//! enters the seen set only after the validator acks the submission, so a
//! failed submit is retried when the bridge redelivers the request on a
//! later poll.

use crate::bridge::{RequestEvent, RequestSource};
use crate::error::{Result, WorkerError};
use crate::metrics;
use crate::model::LinearModel;
use crate::validator::ResultSink;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Every modelId currently resolves to the single default model.
pub const DEFAULT_MODEL_ID: u64 = 0;

pub const DEFAULT_SEEN_CAPACITY: usize = 4096;

// ============================================================================
// Data Types
// ============================================================================

/// Output of processing one RequestEvent.
#[derive(Debug, Clone)]
pub struct PredictionResult {
    pub request_id: u64,
    pub probability: f32,
    /// Canonical textual form of `probability`; the bytes the sink receives.
    pub encoded: String,
}

/// Terminal per-request failure. Recorded and skipped, never raised.
#[derive(Debug, Clone)]
pub struct ProcessingFailure {
    pub request_id: u64,
    pub reason: String,
}

/// Per-request outcome of `process`. Fatal contract violations escape as
/// `WorkerError` instead; everything per-request lands in `Failed`.
#[derive(Debug)]
pub enum ProcessOutcome {
    Completed(PredictionResult),
    Failed(ProcessingFailure),
}

/// Counts for one poll cycle, for logging and the status snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleReport {
    pub polled: usize,
    pub submitted: usize,
    pub duplicates: usize,
    pub failed: usize,
}

// ============================================================================
// Dedup Bookkeeping
// ============================================================================

/// Record of requestIds with a confirmed ack, guarding against redelivery.
/// Bounded: oldest ids are evicted FIFO once over capacity.
pub struct SeenRequests {
    ids: HashSet<u64>,
    order: VecDeque<u64>,
    capacity: usize,
}

impl SeenRequests {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ids: HashSet::new(),
            order: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    /// Record a confirmed ack. Must only be called after the sink
    /// acknowledged the submission.
    pub fn insert(&mut self, id: u64) {
        if !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct RequestPipeline<S, K> {
    source: S,
    sink: K,
    model: Arc<LinearModel>,
    seen: SeenRequests,
}

impl<S: RequestSource, K: ResultSink> RequestPipeline<S, K> {
    pub fn new(source: S, sink: K, model: Arc<LinearModel>, seen_capacity: usize) -> Self {
        Self {
            source,
            sink,
            model,
            seen: SeenRequests::new(seen_capacity),
        }
    }

    /// One bridge round-trip. `SourceUnavailable` propagates to the worker
    /// loop, which decides retry policy.
    pub async fn poll(&self) -> Result<Vec<RequestEvent>> {
        let events = self.source.poll().await?;
        metrics::POLL_CYCLES.inc();
        Ok(events)
    }

    /// decode -> predict -> encode for a single event. Decode failures are
    /// per-request terminal; a shape mismatch out of `predict` means the
    /// loaded weights disagree with the configured contract and escapes as
    /// fatal.
    pub fn process(&self, event: &RequestEvent) -> Result<ProcessOutcome> {
        if event.model_id != DEFAULT_MODEL_ID {
            debug!(
                request_id = event.request_id,
                model_id = event.model_id,
                "non-default modelId, serving with default model"
            );
        }

        let vector =
            match decode_input(&event.input_data, self.model.spec().input_features) {
                Ok(vector) => vector,
                Err(e) => {
                    return Ok(ProcessOutcome::Failed(ProcessingFailure {
                        request_id: event.request_id,
                        reason: e.to_string(),
                    }))
                }
            };

        let probability = self.model.predict(&vector)?;

        Ok(ProcessOutcome::Completed(PredictionResult {
            request_id: event.request_id,
            probability,
            encoded: encode_probability(probability),
        }))
    }

    /// Exactly one sink call per result; no in-cycle retry.
    pub async fn submit(&self, result: &PredictionResult) -> Result<()> {
        self.sink.submit(result.request_id, &result.encoded).await
    }

    /// Run one batch through process + submit, skipping ids the validator
    /// already acked. Per-request failures are recorded in the report; only
    /// fatal errors escape.
    pub async fn process_batch(&mut self, events: &[RequestEvent]) -> Result<CycleReport> {
        let mut report = CycleReport {
            polled: events.len(),
            ..Default::default()
        };

        for event in events {
            if self.seen.contains(event.request_id) {
                report.duplicates += 1;
                metrics::DUPLICATES_SKIPPED.inc();
                debug!(request_id = event.request_id, "already submitted, skipping");
                continue;
            }

            metrics::REQUESTS_PROCESSED.inc();
            let timer = metrics::Timer::new();

            match self.process(event)? {
                ProcessOutcome::Completed(result) => {
                    timer.observe_duration_seconds(&metrics::INFERENCE_LATENCY);

                    match self.submit(&result).await {
                        Ok(()) => {
                            // Ack confirmed; only now does the id enter the
                            // dedup set.
                            self.seen.insert(result.request_id);
                            metrics::SEEN_REQUESTS.set(self.seen.len() as i64);
                            metrics::PREDICTIONS_SUBMITTED.inc();
                            report.submitted += 1;
                            info!(
                                request_id = result.request_id,
                                probability = %result.probability,
                                "prediction submitted"
                            );
                        }
                        Err(e) => {
                            metrics::SUBMISSION_FAILURES.inc();
                            report.failed += 1;
                            warn!(
                                request_id = result.request_id,
                                error = %e,
                                "submission failed, waiting for redelivery"
                            );
                        }
                    }
                }
                ProcessOutcome::Failed(failure) => {
                    metrics::REQUEST_FAILURES.inc();
                    report.failed += 1;
                    warn!(
                        request_id = failure.request_id,
                        reason = %failure.reason,
                        "request failed, skipping"
                    );
                }
            }
        }

        Ok(report)
    }

    /// One full poll cycle: poll the bridge, then drain the batch.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let events = self.poll().await?;
        self.process_batch(&events).await
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

// ============================================================================
// Payload Codec
// ============================================================================

/// Parse an opaque payload into exactly `feature_count` f32 values.
/// Accepts hex (optional `0x` prefix) or base64 over f32 little-endian
/// bytes. Length mismatches and bad encodings are `Decode` errors.
pub fn decode_input(payload: &str, feature_count: usize) -> Result<Vec<f32>> {
    let trimmed = payload.trim();
    let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);

    let bytes = match hex::decode(stripped) {
        Ok(bytes) => bytes,
        Err(_) => BASE64
            .decode(trimmed)
            .map_err(|_| WorkerError::Decode("payload is neither hex nor base64".to_string()))?,
    };

    let expected = feature_count * std::mem::size_of::<f32>();
    if bytes.len() != expected {
        return Err(WorkerError::Decode(format!(
            "expected {} bytes for {} features, got {}",
            expected,
            feature_count,
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Canonical textual form of a probability: Rust's shortest decimal that
/// round-trips to the same f32. The sink is byte-oriented, so both sides
/// must agree on this exact representation.
pub fn encode_probability(probability: f32) -> String {
    format!("{}", probability)
}

/// Hex-encode a feature vector the way the bridge carries it. Used by
/// tests and tooling; the inverse of `decode_input`.
pub fn encode_input(values: &[f32]) -> String {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    #[test]
    fn test_decode_hex_roundtrip() {
        let values = vec![0.5f32, -1.25, 3.0, 0.0];
        let payload = encode_input(&values);

        let decoded = decode_input(&payload, 4).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_decode_accepts_0x_prefix() {
        let values = vec![1.0f32, 2.0];
        let payload = format!("0x{}", encode_input(&values));

        let decoded = decode_input(&payload, 2).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_decode_accepts_base64() {
        let values = vec![0.25f32, 0.75, -0.5];
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let payload = BASE64.encode(bytes);

        let decoded = decode_input(&payload, 3).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        let payload = encode_input(&[1.0f32, 2.0]);
        let err = decode_input(&payload, 3).unwrap_err();
        assert!(matches!(err, WorkerError::Decode(_)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_input("not valid input!!", 2).unwrap_err();
        assert!(matches!(err, WorkerError::Decode(_)));
    }

    #[test]
    fn test_encode_probability_roundtrips() {
        for p in [0.0f32, 1.0, 0.5, 0.574_442_5, 1.0 / 3.0] {
            let encoded = encode_probability(p);
            let parsed: f32 = encoded.parse().unwrap();
            assert_eq!(parsed, p, "{} did not round-trip", encoded);
        }
    }

    #[test]
    fn test_seen_requests_dedup() {
        let mut seen = SeenRequests::new(8);
        assert!(seen.is_empty());

        seen.insert(5);
        seen.insert(5);
        assert!(seen.contains(5));
        assert_eq!(seen.len(), 1);
        assert!(!seen.contains(6));
    }

    #[test]
    fn test_seen_requests_evicts_oldest() {
        let mut seen = SeenRequests::new(3);
        for id in 1..=5 {
            seen.insert(id);
        }

        assert_eq!(seen.len(), 3);
        assert!(!seen.contains(1));
        assert!(!seen.contains(2));
        assert!(seen.contains(3));
        assert!(seen.contains(5));
    }
}
