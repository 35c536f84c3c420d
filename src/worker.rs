//! Worker loop
//!
//! Drives the request pipeline on a fixed interval and owns the lifecycle:
//! cancellable sleep between cycles, per-cycle poll failures retried on the
//! next tick, graceful shutdown on signal. A shutdown request is observed at
//! the top of the loop and during the sleep at the latest; an already
//! started submission is allowed to finish.

use crate::bridge::RequestSource;
use crate::error::{Result, WorkerError};
use crate::metrics;
use crate::pipeline::RequestPipeline;
use crate::state::{WorkerPhase, WorkerState};
use crate::validator::ResultSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub struct Worker<S, K> {
    pipeline: RequestPipeline<S, K>,
    state: Arc<WorkerState>,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl<S: RequestSource, K: ResultSink> Worker<S, K> {
    pub fn new(
        pipeline: RequestPipeline<S, K>,
        state: Arc<WorkerState>,
        poll_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pipeline,
            state,
            poll_interval,
            shutdown,
        }
    }

    /// Run until shutdown is requested or a fatal error surfaces. Poll
    /// failures are transient: logged, then retried after one interval.
    pub async fn run(mut self) -> Result<()> {
        self.state.set_phase(WorkerPhase::Ready).await;
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "worker loop started"
        );

        loop {
            // Shutdown is observed here, before the next poll, at the latest.
            if *self.shutdown.borrow() {
                self.state.set_phase(WorkerPhase::ShuttingDown).await;
                break;
            }

            self.state.set_phase(WorkerPhase::Polling).await;
            let events = match self.pipeline.poll().await {
                Ok(events) => events,
                Err(e @ WorkerError::SourceUnavailable(_)) => {
                    metrics::POLL_FAILURES.inc();
                    warn!(error = %e, "bridge poll failed, retrying next cycle");
                    if self.sleep_or_shutdown().await {
                        self.state.set_phase(WorkerPhase::ShuttingDown).await;
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "unrecoverable poll error");
                    self.state.set_phase(WorkerPhase::Stopped).await;
                    return Err(e);
                }
            };

            self.state.set_phase(WorkerPhase::ProcessingBatch).await;
            let report = match self.pipeline.process_batch(&events).await {
                Ok(report) => report,
                Err(e) => {
                    // Only contract violations escape the batch; shut down
                    // cleanly instead of looping on a broken model.
                    error!(error = %e, "unrecoverable batch error");
                    self.state.set_phase(WorkerPhase::Stopped).await;
                    return Err(e);
                }
            };

            self.state.record_cycle(&report);
            if report.polled > 0 {
                info!(
                    polled = report.polled,
                    submitted = report.submitted,
                    duplicates = report.duplicates,
                    failed = report.failed,
                    "cycle completed"
                );
            } else {
                debug!("no new requests this cycle");
            }

            if self.sleep_or_shutdown().await {
                self.state.set_phase(WorkerPhase::ShuttingDown).await;
                break;
            }
        }

        self.state.set_phase(WorkerPhase::Stopped).await;
        info!("worker loop stopped");
        Ok(())
    }

    /// Sleep one poll interval. Returns true if shutdown was requested,
    /// waking immediately instead of waiting out the interval.
    async fn sleep_or_shutdown(&mut self) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval) => false,
            changed = self.shutdown.changed() => match changed {
                Ok(()) => *self.shutdown.borrow(),
                // Sender dropped; treat as shutdown.
                Err(_) => true,
            },
        }
    }
}
