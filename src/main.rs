use anyhow::Result;
use axum::{extract::State, routing::get, Json, Router};
use ml_oracle_worker::{
    bridge::HttpRequestBridge,
    config::Config,
    metrics,
    model::LinearModel,
    pipeline::RequestPipeline,
    state::{StateSnapshot, WorkerState},
    validator::HttpResultValidator,
    worker::Worker,
};
use std::sync::Arc;
use std::time::Duration;

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Prometheus metrics endpoint
async fn metrics_handler() -> String {
    metrics::export_metrics()
}

/// Worker status endpoint
async fn status_handler(State(state): State<Arc<WorkerState>>) -> Json<StateSnapshot> {
    Json(state.snapshot().await)
}

/// Start the status API server alongside the worker loop
async fn start_status_server(state: Arc<WorkerState>, host: String, port: u16) -> Result<()> {
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/status", get(status_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
    tracing::info!("Status API listening on http://{}:{}", host, port);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Status server error: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with filters
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting ML oracle worker...");

    // Initialize metrics
    metrics::init_metrics();

    // Load configuration
    let config = Config::load()?;
    tracing::info!("Worker address: {}", config.worker_config.address);
    tracing::info!("Request bridge: {}", config.bridge_config.url);
    tracing::info!("Result validator: {}", config.validator_config.url);

    let state = Arc::new(WorkerState::new());

    // Load the model before anything else; the worker must never run with a
    // missing or incompatible model.
    let spec = config.model_config.feature_spec();
    let model = match LinearModel::load(&config.model_config.model_path, spec) {
        Ok(model) => Arc::new(model),
        Err(e) => {
            tracing::error!("Cannot start without a model: {}", e);
            tracing::info!("ML oracle worker shutting down.");
            return Err(e.into());
        }
    };

    let bridge = HttpRequestBridge::new(config.bridge_config.url.clone())?;
    let validator = HttpResultValidator::new(
        config.validator_config.url.clone(),
        config.worker_config.address.clone(),
    )?;

    let pipeline = RequestPipeline::new(
        bridge,
        validator,
        model,
        config.worker_config.seen_capacity,
    );

    // Status API runs alongside the worker loop
    let status_state = state.clone();
    let api_host = config.api_host.clone();
    let api_port = config.api_port;
    tokio::spawn(async move {
        if let Err(e) = start_status_server(status_state, api_host, api_port).await {
            tracing::error!("Status server error: {}", e);
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker = Worker::new(
        pipeline,
        state.clone(),
        Duration::from_secs(config.worker_config.poll_interval_secs),
        shutdown_rx,
    );

    let mut worker_handle = tokio::spawn(worker.run());

    let loop_result = tokio::select! {
        joined = &mut worker_handle => joined?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received, finishing in-flight work...");
            let _ = shutdown_tx.send(true);
            worker_handle.await?
        }
    };

    if let Err(e) = loop_result {
        tracing::error!("Worker loop failed: {}", e);
        tracing::info!("ML oracle worker shutting down.");
        return Err(e.into());
    }

    tracing::info!("ML oracle worker shutting down.");
    Ok(())
}
