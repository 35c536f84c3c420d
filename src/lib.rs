pub mod bridge;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod state;
pub mod validator;
pub mod worker;

// Re-export commonly used types for easier testing
pub use crate::bridge::{HttpRequestBridge, RequestEvent, RequestSource};
pub use crate::error::WorkerError;
pub use crate::model::{FeatureSpec, LinearModel, ModelWeights};
pub use crate::pipeline::{
    decode_input, encode_input, encode_probability, CycleReport, PredictionResult,
    ProcessOutcome, ProcessingFailure, RequestPipeline, SeenRequests,
};
pub use crate::state::{StateSnapshot, WorkerPhase, WorkerState};
pub use crate::validator::{HttpResultValidator, ResultSink, SubmissionAck};
pub use crate::worker::Worker;
