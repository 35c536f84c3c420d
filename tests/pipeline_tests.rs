//! Pipeline integration tests
//!
//! Exercise the poll -> decode -> infer -> encode -> submit cycle against a
//! scripted request source and a recording sink, covering the dedup law,
//! per-request failure isolation, and retry-through-redelivery.

use async_trait::async_trait;
use ml_oracle_worker::error::Result as WorkerResult;
use ml_oracle_worker::{
    encode_input, encode_probability, FeatureSpec, LinearModel, ModelWeights, RequestEvent,
    RequestPipeline, RequestSource, ResultSink, WorkerError,
};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct ScriptedSource {
    batches: Arc<Mutex<VecDeque<WorkerResult<Vec<RequestEvent>>>>>,
}

impl ScriptedSource {
    fn queue(&self, batch: WorkerResult<Vec<RequestEvent>>) {
        self.batches.lock().unwrap().push_back(batch);
    }
}

#[async_trait]
impl RequestSource for ScriptedSource {
    async fn poll(&self) -> WorkerResult<Vec<RequestEvent>> {
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[derive(Clone, Default)]
struct RecordingSink {
    submissions: Arc<Mutex<Vec<(u64, String)>>>,
    failing_ids: Arc<Mutex<HashSet<u64>>>,
}

impl RecordingSink {
    /// Make the next submit for this id fail once, then recover.
    fn fail_next_submit(&self, request_id: u64) {
        self.failing_ids.lock().unwrap().insert(request_id);
    }

    fn submitted(&self) -> Vec<(u64, String)> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn submit(&self, request_id: u64, payload: &str) -> WorkerResult<()> {
        if self.failing_ids.lock().unwrap().remove(&request_id) {
            return Err(WorkerError::Submission(format!(
                "validator timeout for request {}",
                request_id
            )));
        }
        self.submissions
            .lock()
            .unwrap()
            .push((request_id, payload.to_string()));
        Ok(())
    }
}

const BIAS: f32 = 0.3;

fn test_model() -> Arc<LinearModel> {
    let spec = FeatureSpec {
        input_features: 10,
        output_features: 1,
    };
    let artifact = ModelWeights {
        input_features: 10,
        output_features: 1,
        weights: vec![0.5, -0.25, 1.0, 0.0, 0.75, -1.5, 0.1, 0.2, -0.3, 0.4],
        bias: vec![BIAS],
    };
    Arc::new(LinearModel::from_weights(artifact, spec).unwrap())
}

fn event(request_id: u64, values: &[f32]) -> RequestEvent {
    RequestEvent {
        request_id,
        model_id: 0,
        input_data: encode_input(values),
        requestor: "0xRequestor".to_string(),
    }
}

fn pipeline(
    source: &ScriptedSource,
    sink: &RecordingSink,
) -> RequestPipeline<ScriptedSource, RecordingSink> {
    RequestPipeline::new(source.clone(), sink.clone(), test_model(), 64)
}

#[tokio::test]
async fn test_zero_vector_probability_is_pure_bias() {
    let source = ScriptedSource::default();
    let sink = RecordingSink::default();
    source.queue(Ok(vec![event(1, &[0.0; 10])]));

    let mut pipeline = pipeline(&source, &sink);
    let report = pipeline.run_cycle().await.unwrap();
    assert_eq!(report.submitted, 1);

    let expected = 1.0 / (1.0 + (-BIAS).exp());
    let submissions = sink.submitted();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].0, 1);
    assert_eq!(submissions[0].1, encode_probability(expected));

    let parsed: f32 = submissions[0].1.parse().unwrap();
    assert!(parsed > 0.0 && parsed < 1.0);
    assert!((parsed - expected).abs() < 1e-6);
}

#[tokio::test]
async fn test_duplicate_ids_in_one_batch_submit_once() {
    let source = ScriptedSource::default();
    let sink = RecordingSink::default();
    source.queue(Ok(vec![
        event(5, &[1.0; 10]),
        event(5, &[1.0; 10]),
    ]));

    let mut pipeline = pipeline(&source, &sink);
    let report = pipeline.run_cycle().await.unwrap();

    assert_eq!(report.polled, 2);
    assert_eq!(report.submitted, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(sink.submitted().len(), 1);
}

#[tokio::test]
async fn test_redelivered_ids_skip_across_cycles() {
    let source = ScriptedSource::default();
    let sink = RecordingSink::default();
    source.queue(Ok(vec![event(9, &[0.5; 10])]));
    source.queue(Ok(vec![event(9, &[0.5; 10]), event(10, &[0.5; 10])]));

    let mut pipeline = pipeline(&source, &sink);
    pipeline.run_cycle().await.unwrap();
    let report = pipeline.run_cycle().await.unwrap();

    assert_eq!(report.duplicates, 1);
    assert_eq!(report.submitted, 1);

    let ids: Vec<u64> = sink.submitted().iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![9, 10]);
}

#[tokio::test]
async fn test_decode_failure_does_not_poison_the_batch() {
    let source = ScriptedSource::default();
    let sink = RecordingSink::default();
    let mut bad = event(2, &[1.0; 10]);
    bad.input_data = "zz-not-decodable".to_string();
    source.queue(Ok(vec![event(1, &[1.0; 10]), bad, event(3, &[1.0; 10])]));

    let mut pipeline = pipeline(&source, &sink);
    let report = pipeline.run_cycle().await.unwrap();

    assert_eq!(report.polled, 3);
    assert_eq!(report.submitted, 2);
    assert_eq!(report.failed, 1);

    let ids: Vec<u64> = sink.submitted().iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![1, 3]);
}

#[tokio::test]
async fn test_truncated_payload_is_per_request_fatal() {
    let source = ScriptedSource::default();
    let sink = RecordingSink::default();
    // 3 floats for a 10-feature model
    source.queue(Ok(vec![event(4, &[1.0, 2.0, 3.0]), event(5, &[1.0; 10])]));

    let mut pipeline = pipeline(&source, &sink);
    let report = pipeline.run_cycle().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.submitted, 1);
    assert_eq!(sink.submitted()[0].0, 5);
}

#[tokio::test]
async fn test_failed_submit_retries_through_redelivery() {
    let source = ScriptedSource::default();
    let sink = RecordingSink::default();
    sink.fail_next_submit(7);
    source.queue(Ok(vec![event(7, &[2.0; 10])]));
    source.queue(Ok(vec![event(7, &[2.0; 10])]));

    let mut pipeline = pipeline(&source, &sink);

    let first = pipeline.run_cycle().await.unwrap();
    assert_eq!(first.submitted, 0);
    assert_eq!(first.failed, 1);
    // Not acked, so the id must not be in the dedup set yet
    assert_eq!(pipeline.seen_count(), 0);
    assert!(sink.submitted().is_empty());

    let second = pipeline.run_cycle().await.unwrap();
    assert_eq!(second.submitted, 1);
    assert_eq!(second.duplicates, 0);

    // Exactly one successful submission recorded
    assert_eq!(sink.submitted().len(), 1);
    assert_eq!(sink.submitted()[0].0, 7);
    assert_eq!(pipeline.seen_count(), 1);
}

#[tokio::test]
async fn test_source_failure_propagates_to_caller() {
    let source = ScriptedSource::default();
    let sink = RecordingSink::default();
    source.queue(Err(WorkerError::SourceUnavailable(
        "connection refused".to_string(),
    )));

    let mut pipeline = pipeline(&source, &sink);
    let err = pipeline.run_cycle().await.unwrap_err();
    assert!(matches!(err, WorkerError::SourceUnavailable(_)));
    assert!(!err.is_fatal());

    // The source recovers on the next cycle
    source.queue(Ok(vec![event(1, &[0.0; 10])]));
    let report = pipeline.run_cycle().await.unwrap();
    assert_eq!(report.submitted, 1);
}

#[tokio::test]
async fn test_empty_poll_is_a_quiet_cycle() {
    let source = ScriptedSource::default();
    let sink = RecordingSink::default();

    let mut pipeline = pipeline(&source, &sink);
    let report = pipeline.run_cycle().await.unwrap();

    assert_eq!(report.polled, 0);
    assert_eq!(report.submitted, 0);
    assert!(sink.submitted().is_empty());
}

#[tokio::test]
async fn test_non_default_model_id_served_by_default_model() {
    let source = ScriptedSource::default();
    let sink = RecordingSink::default();
    let mut ev = event(11, &[0.0; 10]);
    ev.model_id = 3;
    source.queue(Ok(vec![ev]));

    let mut pipeline = pipeline(&source, &sink);
    let report = pipeline.run_cycle().await.unwrap();

    assert_eq!(report.submitted, 1);
    let expected = 1.0 / (1.0 + (-BIAS).exp());
    assert_eq!(sink.submitted()[0].1, encode_probability(expected));
}
