//! Router handle - the per-node unit router's message surface
//!
//! One router per node, started at boot. The actor implementation lives in
//! the `unit_router` crate; the handle and message types are contract.

use tokio::sync::{mpsc, oneshot};

use crate::{NodeId, PipelineError, UnitSpec, UnitTask};

/// Messages accepted by a node's router actor
pub enum RouterMsg {
    /// Route a task to the live worker for `spec`, starting one if needed.
    /// Start failures are reported through `reply` before anything is
    /// enqueued.
    Cast {
        spec: UnitSpec,
        task: UnitTask,
        reply: oneshot::Sender<Result<(), PipelineError>>,
    },

    /// A watched worker terminated. The generation lets the router ignore
    /// stale notices for a spec that has already been restarted.
    WorkerExited { spec: UnitSpec, generation: u64 },

    /// Stop the router and signal every registered worker to stop
    Shutdown,
}

/// Handle to a node's router
#[derive(Clone)]
pub struct RouterHandle {
    node: NodeId,
    tx: mpsc::Sender<RouterMsg>,
}

impl RouterHandle {
    pub fn new(node: NodeId, tx: mpsc::Sender<RouterMsg>) -> Self {
        Self { node, tx }
    }

    /// Node this router serves
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Route `task` to the worker for `spec` on this router's node
    ///
    /// Resolves only after the router has a live worker and has enqueued
    /// the task; a failed worker start surfaces here. A task that never
    /// reaches a worker is dropped, which releases whatever obligations it
    /// carries.
    pub async fn cast(&self, spec: UnitSpec, task: UnitTask) -> Result<(), PipelineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RouterMsg::Cast { spec, task, reply })
            .await
            .map_err(|_| PipelineError::unreachable(&self.node))?;
        rx.await
            .map_err(|_| PipelineError::unreachable(&self.node))?
    }

    /// Report a worker exit observed by a watcher task
    pub async fn notify_worker_exited(&self, spec: UnitSpec, generation: u64) {
        let _ = self
            .tx
            .send(RouterMsg::WorkerExited { spec, generation })
            .await;
    }

    /// Stop the router; all registered workers are signalled to stop
    pub async fn shutdown(&self) {
        let _ = self.tx.send(RouterMsg::Shutdown).await;
    }
}

impl std::fmt::Debug for RouterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterHandle").field("node", &self.node).finish()
    }
}
