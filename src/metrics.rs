//! Operation Metrics
//!
//! Cache-line aligned counters for hot-path updates plus prometheus
//! collectors for exposition. The executor's completion hook feeds both on
//! every finished operation.

use chrono::Utc;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::executor::OperationKind;

// =============================================================================
// Aligned Totals (hot path)
// =============================================================================

/// Running totals, aligned to prevent false sharing between the admission
/// path and completing operation tasks
#[repr(C, align(64))]
#[derive(Debug, Default)]
struct Totals {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    last_update_ms: AtomicU64,
    _padding: [u8; 24],
}

/// Point-in-time copy of the running totals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationStatsSnapshot {
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub dropped: u64,
    /// Unix millis of the last update, 0 if none yet
    pub last_update_ms: u64,
}

// =============================================================================
// Operation Metrics
// =============================================================================

/// Counters and duration histograms for volume operations
pub struct OperationMetrics {
    totals: Totals,
    started_total: IntCounterVec,
    completed_total: IntCounterVec,
    dropped_total: IntCounterVec,
    duration_seconds: HistogramVec,
}

impl OperationMetrics {
    pub fn new() -> Arc<Self> {
        let started_total = IntCounterVec::new(
            Opts::new(
                "volume_operations_started_total",
                "Volume operations admitted and started",
            ),
            &["operation"],
        )
        .expect("valid metric definition");

        let completed_total = IntCounterVec::new(
            Opts::new(
                "volume_operations_completed_total",
                "Volume operations completed, by outcome",
            ),
            &["operation", "outcome"],
        )
        .expect("valid metric definition");

        let dropped_total = IntCounterVec::new(
            Opts::new(
                "volume_operations_dropped_total",
                "Volume operations dropped because their key was in flight",
            ),
            &["operation"],
        )
        .expect("valid metric definition");

        let duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "volume_operation_duration_seconds",
                "Wall duration of completed volume operations",
            ),
            &["operation"],
        )
        .expect("valid metric definition");

        Arc::new(Self {
            totals: Totals::default(),
            started_total,
            completed_total,
            dropped_total,
            duration_seconds,
        })
    }

    /// Register the prometheus collectors with a registry
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.started_total.clone()))?;
        registry.register(Box::new(self.completed_total.clone()))?;
        registry.register(Box::new(self.dropped_total.clone()))?;
        registry.register(Box::new(self.duration_seconds.clone()))?;
        Ok(())
    }

    /// Record an admitted operation
    pub fn record_started(&self, kind: OperationKind) {
        self.totals.started.fetch_add(1, Ordering::Relaxed);
        self.touch();
        self.started_total.with_label_values(&[kind.as_str()]).inc();
    }

    /// Record a submission dropped on key conflict
    pub fn record_dropped(&self, kind: OperationKind) {
        self.totals.dropped.fetch_add(1, Ordering::Relaxed);
        self.touch();
        self.dropped_total.with_label_values(&[kind.as_str()]).inc();
    }

    /// Record a completed operation with its outcome and wall duration
    pub fn record_completed(&self, kind: OperationKind, success: bool, duration: Duration) {
        let outcome = if success {
            self.totals.succeeded.fetch_add(1, Ordering::Relaxed);
            "success"
        } else {
            self.totals.failed.fetch_add(1, Ordering::Relaxed);
            "failure"
        };
        self.touch();
        self.completed_total
            .with_label_values(&[kind.as_str(), outcome])
            .inc();
        self.duration_seconds
            .with_label_values(&[kind.as_str()])
            .observe(duration.as_secs_f64());
    }

    /// Snapshot the running totals
    pub fn snapshot(&self) -> OperationStatsSnapshot {
        OperationStatsSnapshot {
            started: self.totals.started.load(Ordering::Relaxed),
            succeeded: self.totals.succeeded.load(Ordering::Relaxed),
            failed: self.totals.failed.load(Ordering::Relaxed),
            dropped: self.totals.dropped.load(Ordering::Relaxed),
            last_update_ms: self.totals.last_update_ms.load(Ordering::Acquire),
        }
    }

    fn touch(&self) {
        self.totals
            .last_update_ms
            .store(Utc::now().timestamp_millis() as u64, Ordering::Release);
    }
}
