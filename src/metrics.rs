use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::time::Instant;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Poll cycle metrics
    pub static ref POLL_CYCLES: IntCounter = IntCounter::new(
        "poll_cycles_total",
        "Total number of bridge poll cycles"
    ).unwrap();

    pub static ref POLL_FAILURES: IntCounter = IntCounter::new(
        "poll_failures_total",
        "Total number of failed bridge polls"
    ).unwrap();

    // Request metrics
    pub static ref REQUESTS_PROCESSED: IntCounter = IntCounter::new(
        "requests_processed_total",
        "Total number of prediction requests pulled through the pipeline"
    ).unwrap();

    pub static ref DUPLICATES_SKIPPED: IntCounter = IntCounter::new(
        "duplicates_skipped_total",
        "Total number of redelivered requests skipped by the dedup set"
    ).unwrap();

    pub static ref REQUEST_FAILURES: IntCounter = IntCounter::new(
        "request_failures_total",
        "Total number of requests that failed during decode or inference"
    ).unwrap();

    // Submission metrics
    pub static ref PREDICTIONS_SUBMITTED: IntCounter = IntCounter::new(
        "predictions_submitted_total",
        "Total number of predictions acknowledged by the validator"
    ).unwrap();

    pub static ref SUBMISSION_FAILURES: IntCounter = IntCounter::new(
        "submission_failures_total",
        "Total number of rejected or timed-out submissions"
    ).unwrap();

    pub static ref SEEN_REQUESTS: IntGauge = IntGauge::new(
        "seen_requests",
        "Current number of request ids in the dedup set"
    ).unwrap();

    // Latency metrics (in seconds)
    pub static ref INFERENCE_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "inference_duration_seconds",
            "Decode plus inference latency per request in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0])
    ).unwrap();
}

/// Initialize metrics registry
pub fn init_metrics() {
    // Register poll metrics
    REGISTRY.register(Box::new(POLL_CYCLES.clone())).unwrap();
    REGISTRY.register(Box::new(POLL_FAILURES.clone())).unwrap();

    // Register request metrics
    REGISTRY.register(Box::new(REQUESTS_PROCESSED.clone())).unwrap();
    REGISTRY.register(Box::new(DUPLICATES_SKIPPED.clone())).unwrap();
    REGISTRY.register(Box::new(REQUEST_FAILURES.clone())).unwrap();

    // Register submission metrics
    REGISTRY.register(Box::new(PREDICTIONS_SUBMITTED.clone())).unwrap();
    REGISTRY.register(Box::new(SUBMISSION_FAILURES.clone())).unwrap();
    REGISTRY.register(Box::new(SEEN_REQUESTS.clone())).unwrap();

    // Register latency metrics
    REGISTRY.register(Box::new(INFERENCE_LATENCY.clone())).unwrap();

    tracing::info!(
        "Metrics registry initialized with {} collectors",
        REGISTRY.gather().len()
    );
}

/// Helper struct for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration_seconds(&self, histogram: &Histogram) {
        let duration = self.start.elapsed();
        histogram.observe(duration.as_secs_f64());
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Export metrics in Prometheus format
pub fn export_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
