//! Inference service
//!
//! Wraps the pre-trained binary classifier behind a single `predict` call.
//! The model is one learned affine transform composed with a logistic
//! squashing function, `probability = sigmoid(W·x + b)`, so alternate
//! implementations produce bit-compatible results given the same weights.
//! The artifact is a JSON weights file; its shapes are checked against the
//! configured feature contract at load time and the worker refuses to start
//! on any disagreement.

use crate::error::{Result, WorkerError};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub input_features: usize,
    pub output_features: usize,
}

/// On-disk model artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelWeights {
    #[serde(rename = "inputFeatures")]
    pub input_features: usize,
    #[serde(rename = "outputFeatures")]
    pub output_features: usize,
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

/// Loaded model handle. Read-only after `load`, safe to share across tasks
/// and concurrent `predict` calls without locking.
#[derive(Debug)]
pub struct LinearModel {
    weights: Array1<f32>,
    bias: f32,
    spec: FeatureSpec,
}

impl LinearModel {
    /// Load and shape-check a model artifact. Any failure here is fatal to
    /// the worker: it must never run with a missing or incompatible model.
    pub fn load(path: impl AsRef<Path>, spec: FeatureSpec) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            WorkerError::ModelLoad(format!("cannot read {}: {}", path.display(), e))
        })?;

        let artifact: ModelWeights = serde_json::from_str(&raw)
            .map_err(|e| WorkerError::ModelLoad(format!("invalid model artifact: {}", e)))?;

        let model = Self::from_weights(artifact, spec)?;
        info!(
            "Model loaded from {} ({} -> {} features)",
            path.display(),
            spec.input_features,
            spec.output_features
        );
        Ok(model)
    }

    /// Build a model from in-memory weights, enforcing the feature contract.
    pub fn from_weights(artifact: ModelWeights, spec: FeatureSpec) -> Result<Self> {
        if artifact.input_features != spec.input_features
            || artifact.output_features != spec.output_features
        {
            return Err(WorkerError::ModelLoad(format!(
                "artifact shape {}x{} does not match configured {}x{}",
                artifact.input_features,
                artifact.output_features,
                spec.input_features,
                spec.output_features
            )));
        }

        if spec.output_features != 1 {
            return Err(WorkerError::ModelLoad(format!(
                "binary classifier expects a single output, got {}",
                spec.output_features
            )));
        }

        if artifact.weights.len() != spec.input_features {
            return Err(WorkerError::ModelLoad(format!(
                "expected {} weights, artifact has {}",
                spec.input_features,
                artifact.weights.len()
            )));
        }

        if artifact.bias.len() != 1 {
            return Err(WorkerError::ModelLoad(format!(
                "expected 1 bias term, artifact has {}",
                artifact.bias.len()
            )));
        }

        Ok(Self {
            weights: Array1::from_vec(artifact.weights),
            bias: artifact.bias[0],
            spec,
        })
    }

    pub fn spec(&self) -> FeatureSpec {
        self.spec
    }

    /// Run the classifier on one feature vector. Pure function of its
    /// inputs; the returned probability is always in [0.0, 1.0].
    pub fn predict(&self, input: &[f32]) -> Result<f32> {
        if input.len() != self.spec.input_features {
            return Err(WorkerError::ShapeMismatch {
                expected: self.spec.input_features,
                actual: input.len(),
            });
        }

        let x = ArrayView1::from(input);
        let z = self.weights.dot(&x) + self.bias;
        Ok(sigmoid(z))
    }
}

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}
