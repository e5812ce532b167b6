//! Stream metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for a single stream run
#[derive(Debug, Default)]
pub struct StreamMetrics {
    /// Element tasks launched
    launched: AtomicU64,
    /// Completed elements delivered
    done: AtomicU64,
    /// Element tasks that aborted before completing
    aborted: AtomicU64,
    /// Chunks delivered to the consumer
    chunks: AtomicU64,
    /// Elements injected mid-stream via emit
    injected: AtomicU64,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launched(&self) -> u64 {
        self.launched.load(Ordering::Relaxed)
    }

    pub fn add_launched(&self, n: u64) {
        self.launched.fetch_add(n, Ordering::Relaxed);
    }

    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    pub fn inc_done(&self) {
        self.done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn aborted(&self) -> u64 {
        self.aborted.load(Ordering::Relaxed)
    }

    pub fn inc_aborted(&self) {
        self.aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunks(&self) -> u64 {
        self.chunks.load(Ordering::Relaxed)
    }

    pub fn inc_chunks(&self) {
        self.chunks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn injected(&self) -> u64 {
        self.injected.load(Ordering::Relaxed)
    }

    pub fn add_injected(&self, n: u64) {
        self.injected.fetch_add(n, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> StreamMetricsSnapshot {
        StreamMetricsSnapshot {
            launched: self.launched(),
            done: self.done(),
            aborted: self.aborted(),
            chunks: self.chunks(),
            injected: self.injected(),
        }
    }
}

/// Snapshot of stream metrics (for reporting)
#[derive(Debug, Clone, Copy)]
pub struct StreamMetricsSnapshot {
    pub launched: u64,
    pub done: u64,
    pub aborted: u64,
    pub chunks: u64,
    pub injected: u64,
}
