use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;

use crate::model::FeatureSpec;
use crate::pipeline::DEFAULT_SEEN_CAPACITY;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub model_config: ModelConfig,
    pub bridge_config: BridgeConfig,
    pub validator_config: ValidatorConfig,
    pub worker_config: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_path: String,
    pub input_features: usize,
    pub output_features: usize,
}

impl ModelConfig {
    pub fn feature_spec(&self) -> FeatureSpec {
        FeatureSpec {
            input_features: self.input_features,
            output_features: self.output_features,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub address: String,
    pub poll_interval_secs: u64,
    pub seen_capacity: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let api_port = env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        // Model Configuration
        let model_path =
            env::var("MODEL_PATH").unwrap_or_else(|_| "models/classifier.json".to_string());

        let input_features = env::var("INPUT_FEATURES")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let output_features = env::var("OUTPUT_FEATURES")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .unwrap_or(1);

        if input_features == 0 {
            return Err(anyhow!("INPUT_FEATURES must be greater than zero"));
        }

        // Bridge and validator endpoints
        let bridge_url =
            env::var("BRIDGE_URL").unwrap_or_else(|_| "http://localhost:8545".to_string());

        let validator_url =
            env::var("VALIDATOR_URL").unwrap_or_else(|_| "http://localhost:8546".to_string());

        // Worker Configuration
        let worker_address =
            env::var("WORKER_ADDRESS").unwrap_or_else(|_| "local-worker".to_string());

        let poll_interval_secs = env::var("POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        if poll_interval_secs == 0 {
            return Err(anyhow!("POLL_INTERVAL_SECS must be greater than zero"));
        }

        let seen_capacity = env::var("SEEN_CAPACITY")
            .unwrap_or_else(|_| DEFAULT_SEEN_CAPACITY.to_string())
            .parse()
            .unwrap_or(DEFAULT_SEEN_CAPACITY);

        Ok(Self {
            api_host,
            api_port,
            model_config: ModelConfig {
                model_path,
                input_features,
                output_features,
            },
            bridge_config: BridgeConfig { url: bridge_url },
            validator_config: ValidatorConfig { url: validator_url },
            worker_config: WorkerConfig {
                address: worker_address,
                poll_interval_secs,
                seen_capacity,
            },
        })
    }
}
