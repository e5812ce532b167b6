//! Router metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for a single node's router
#[derive(Debug, Default)]
pub struct RouterMetrics {
    /// Total casts routed
    casts: AtomicU64,
    /// Casts that failed (unknown kind, start failure, worker lost)
    failed_casts: AtomicU64,
    /// Workers started (first start and restarts alike)
    workers_started: AtomicU64,
    /// Worker exits observed (TTL expiry or crash)
    workers_exited: AtomicU64,
}

impl RouterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn casts(&self) -> u64 {
        self.casts.load(Ordering::Relaxed)
    }

    pub fn inc_casts(&self) {
        self.casts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed_casts(&self) -> u64 {
        self.failed_casts.load(Ordering::Relaxed)
    }

    pub fn inc_failed_casts(&self) {
        self.failed_casts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn workers_started(&self) -> u64 {
        self.workers_started.load(Ordering::Relaxed)
    }

    pub fn inc_workers_started(&self) {
        self.workers_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn workers_exited(&self) -> u64 {
        self.workers_exited.load(Ordering::Relaxed)
    }

    pub fn inc_workers_exited(&self) {
        self.workers_exited.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> RouterMetricsSnapshot {
        RouterMetricsSnapshot {
            casts: self.casts(),
            failed_casts: self.failed_casts(),
            workers_started: self.workers_started(),
            workers_exited: self.workers_exited(),
        }
    }
}

/// Snapshot of router metrics (for reporting)
#[derive(Debug, Clone, Copy)]
pub struct RouterMetricsSnapshot {
    pub casts: u64,
    pub failed_casts: u64,
    pub workers_started: u64,
    pub workers_exited: u64,
}
