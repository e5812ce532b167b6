//! Router - per-node worker placement and delivery
//!
//! One router actor per node. It owns the spec -> worker table and is the
//! only writer of it; workers run in their own tasks. The router does not
//! supervise across restarts: a worker exit just clears the entry, and the
//! next cast lazily starts a fresh worker.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use contracts::{
    NodeId, PipelineError, Registries, RouterHandle, RouterMsg, UnitKind, UnitSpec, UnitTask,
    WorkerHandle,
};
use observability::{record_worker_exited, record_worker_started};

use crate::metrics::RouterMetrics;

const ROUTER_QUEUE_CAPACITY: usize = 64;

/// The per-node unit router
pub struct Router;

impl Router {
    /// Spawn a router actor for `node`
    #[instrument(name = "router_spawn", skip(registries), fields(node = %node))]
    pub fn spawn(node: NodeId, registries: Arc<Registries>) -> (RouterHandle, Arc<RouterMetrics>) {
        let (tx, rx) = mpsc::channel(ROUTER_QUEUE_CAPACITY);
        let handle = RouterHandle::new(node.clone(), tx);
        let metrics = Arc::new(RouterMetrics::new());

        let core = RouterCore {
            node,
            registries,
            handle: handle.clone(),
            table: HashMap::new(),
            generation: 0,
            metrics: Arc::clone(&metrics),
        };
        tokio::spawn(core.run(rx));

        (handle, metrics)
    }
}

struct WorkerEntry {
    handle: WorkerHandle,
    generation: u64,
}

struct RouterCore {
    node: NodeId,
    registries: Arc<Registries>,
    /// Handle back to this actor, cloned into exit watchers
    handle: RouterHandle,
    table: HashMap<UnitSpec, WorkerEntry>,
    /// Monotonic start counter; exit notices carry it so a stale notice
    /// never evicts a restarted worker
    generation: u64,
    metrics: Arc<RouterMetrics>,
}

impl RouterCore {
    async fn run(mut self, mut rx: mpsc::Receiver<RouterMsg>) {
        debug!(node = %self.node, "router started");

        while let Some(msg) = rx.recv().await {
            match msg {
                RouterMsg::Cast { spec, task, reply } => {
                    self.metrics.inc_casts();
                    let result = self.route(spec, task).await;
                    if result.is_err() {
                        self.metrics.inc_failed_casts();
                    }
                    let _ = reply.send(result);
                }
                RouterMsg::WorkerExited { spec, generation } => {
                    self.evict(&spec, generation);
                }
                RouterMsg::Shutdown => break,
            }
        }

        // Dropping the table closes every worker's task queue, which is the
        // stop signal for workers this router owns.
        let live = self.table.len();
        self.table.clear();
        info!(node = %self.node, workers = live, "router shutdown complete");
    }

    /// Route a task to the live worker for `spec`, starting one on demand
    async fn route(&mut self, spec: UnitSpec, task: UnitTask) -> Result<(), PipelineError> {
        let kind = self.registries.unit_kind(&spec.kind)?;

        if !self.table.contains_key(&spec) {
            self.start_worker(&kind, &spec).await?;
        }

        let entry = self.table.get(&spec).expect("worker just ensured");
        match kind.deliver(&entry.handle, task) {
            Ok(()) => Ok(()),
            Err(task) => {
                // Queue closed before the exit notice arrived; restart once.
                let stale = entry.generation;
                self.evict(&spec, stale);
                self.start_worker(&kind, &spec).await?;
                let entry = self.table.get(&spec).expect("worker just started");
                kind.deliver(&entry.handle, task)
                    .map_err(|_| PipelineError::WorkerLost { spec: spec.clone() })
            }
        }
    }

    async fn start_worker(
        &mut self,
        kind: &Arc<dyn UnitKind>,
        spec: &UnitSpec,
    ) -> Result<(), PipelineError> {
        debug!(node = %self.node, spec = %spec, "starting worker");
        let mut handle = kind.start(&spec.arg).await?;

        self.generation += 1;
        let generation = self.generation;

        if let Some(exit) = handle.take_exit() {
            let router = self.handle.clone();
            let watched = spec.clone();
            tokio::spawn(async move {
                let _ = exit.await;
                router.notify_worker_exited(watched, generation).await;
            });
        }

        self.metrics.inc_workers_started();
        record_worker_started(&spec.kind);
        self.table
            .insert(spec.clone(), WorkerEntry { handle, generation });
        Ok(())
    }

    fn evict(&mut self, spec: &UnitSpec, generation: u64) {
        if let Some(entry) = self.table.get(spec) {
            if entry.generation != generation {
                return;
            }
            self.table.remove(spec);
            self.metrics.inc_workers_exited();
            record_worker_exited(&spec.kind);
            warn!(node = %self.node, spec = %spec, "worker exited; next cast restarts it");
        }
    }
}
