use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Input shape mismatch: expected {expected} features, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Request source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Input decode failed: {0}")]
    Decode(String),

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;

impl WorkerError {
    /// Fatal errors terminate the process. Everything else is retried on a
    /// later cycle or recorded against the offending request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WorkerError::ModelLoad(_) | WorkerError::ShapeMismatch { .. } | WorkerError::Config(_)
        )
    }
}

impl From<anyhow::Error> for WorkerError {
    fn from(err: anyhow::Error) -> Self {
        WorkerError::Internal(err.to_string())
    }
}
