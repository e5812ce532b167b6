//! Unit capability contract
//!
//! A unit is an on-demand worker holding locally-loaded state on a specific
//! node. A unit kind supplies `start` / `deliver` / `home_node`; the router
//! owns the lifecycle (lazy start, exit observation, shutdown).

use std::any::Any;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::{NodeId, PipelineError};

/// Worker-local state, produced by the kind at start and owned by the
/// worker task on the home node.
pub type UnitState = Box<dyn Any + Send>;

/// A task delivered to a worker; executed against the worker's state.
/// Side effects only, the return value is the task's own business.
pub type UnitTask = Box<dyn FnOnce(&mut UnitState) + Send>;

/// Worker identity: `(kind, arg)`. Two specs are equal iff both components
/// are equal; at most one live worker exists per spec in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitSpec {
    /// Kind name, resolved through the per-node kind registry
    pub kind: String,

    /// Kind-interpreted argument (e.g. a file key)
    pub arg: String,
}

impl UnitSpec {
    pub fn new(kind: impl Into<String>, arg: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            arg: arg.into(),
        }
    }
}

impl fmt::Display for UnitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.arg)
    }
}

/// Handle to a running worker
///
/// Carries the task queue plus a one-shot exit signal. The router takes the
/// exit signal once to watch for termination; the queue stays usable for
/// deliveries until the worker stops.
pub struct WorkerHandle {
    tasks: mpsc::UnboundedSender<UnitTask>,
    exit: Option<oneshot::Receiver<()>>,
}

impl WorkerHandle {
    pub fn new(tasks: mpsc::UnboundedSender<UnitTask>, exit: oneshot::Receiver<()>) -> Self {
        Self {
            tasks,
            exit: Some(exit),
        }
    }

    /// Enqueue a task for the worker (non-blocking)
    ///
    /// Returns the task back if the worker's queue has already closed, so
    /// the caller can retry against a fresh worker.
    pub fn deliver(&self, task: UnitTask) -> Result<(), UnitTask> {
        self.tasks.send(task).map_err(|e| e.0)
    }

    /// Take the exit signal; resolves when the worker terminates for any
    /// reason (TTL expiry, queue close, panic). Yields `None` after the
    /// first call.
    pub fn take_exit(&mut self) -> Option<oneshot::Receiver<()>> {
        self.exit.take()
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("closed", &self.tasks.is_closed())
            .finish()
    }
}

/// Capability contract a worker kind must satisfy
///
/// `home_node` must be pure and stable: the router uses it to place the
/// single live worker for a spec.
#[async_trait]
pub trait UnitKind: Send + Sync {
    /// Registry name of this kind
    fn kind_name(&self) -> &str;

    /// Home node for the given argument
    fn home_node(&self, arg: &str) -> NodeId;

    /// Construct a worker; may load local data. Failures surface
    /// synchronously to the caster.
    async fn start(&self, arg: &str) -> Result<WorkerHandle, PipelineError>;

    /// Enqueue a task for a running worker (non-blocking)
    fn deliver(&self, worker: &WorkerHandle, task: UnitTask) -> Result<(), UnitTask> {
        worker.deliver(task)
    }
}
