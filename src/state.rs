//! Worker state
//!
//! Single source of truth for the worker lifecycle phase and processing
//! counters. The phase follows `Starting -> Ready -> (Polling ->
//! ProcessingBatch)* -> Stopped`; snapshots feed the status endpoint.

use crate::pipeline::CycleReport;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Worker lifecycle phase
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum WorkerPhase {
    /// Loading configuration and the model artifact
    Starting,
    /// Model loaded, loop not yet polling
    Ready,
    /// Querying the bridge for new requests
    Polling,
    /// Draining the current batch
    ProcessingBatch,
    /// Shutdown requested, finishing in-flight work
    ShuttingDown,
    /// Loop exited; no further polling or submission
    Stopped,
}

/// Centralized worker state (single source of truth)
pub struct WorkerState {
    phase: Arc<RwLock<WorkerPhase>>,
    cycles: AtomicU64,
    polled: AtomicU64,
    submitted: AtomicU64,
    duplicates: AtomicU64,
    failed: AtomicU64,
    started_at: i64,
}

impl WorkerState {
    pub fn new() -> Self {
        Self {
            phase: Arc::new(RwLock::new(WorkerPhase::Starting)),
            cycles: AtomicU64::new(0),
            polled: AtomicU64::new(0),
            submitted: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            started_at: chrono::Utc::now().timestamp(),
        }
    }

    pub async fn phase(&self) -> WorkerPhase {
        self.phase.read().await.clone()
    }

    pub async fn set_phase(&self, phase: WorkerPhase) {
        let mut current = self.phase.write().await;
        if *current != phase {
            tracing::debug!("Worker phase transition: {:?} -> {:?}", *current, phase);
        }
        *current = phase;
    }

    pub async fn is_stopped(&self) -> bool {
        matches!(*self.phase.read().await, WorkerPhase::Stopped)
    }

    /// Fold one cycle's counts into the totals.
    pub fn record_cycle(&self, report: &CycleReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.polled.fetch_add(report.polled as u64, Ordering::Relaxed);
        self.submitted
            .fetch_add(report.submitted as u64, Ordering::Relaxed);
        self.duplicates
            .fetch_add(report.duplicates as u64, Ordering::Relaxed);
        self.failed.fetch_add(report.failed as u64, Ordering::Relaxed);
    }

    pub async fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            phase: self.phase().await,
            cycles: self.cycles.load(Ordering::Relaxed),
            polled: self.polled.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            started_at: self.started_at,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

impl Default for WorkerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable snapshot of worker state for the status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub phase: WorkerPhase,
    pub cycles: u64,
    pub polled: u64,
    pub submitted: u64,
    pub duplicates: u64,
    pub failed: u64,
    pub started_at: i64,
    pub timestamp: i64,
}
