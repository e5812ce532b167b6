//! SimpleUnit - reference single-threaded worker kind
//!
//! Holds `state = init(arg)` and executes delivered tasks against it, one at
//! a time. An idle timer of duration `ttl` resets on every delivery; expiry
//! terminates the worker normally. TTL zero disables idle expiry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, instrument};

use contracts::{NodeId, PipelineError, UnitKind, UnitState, WorkerHandle};

/// Worker state constructor; runs inside `start`, failures surface to the
/// caster.
pub type UnitInitFn = Arc<dyn Fn(&str) -> Result<UnitState, PipelineError> + Send + Sync>;

/// Home node placement; must be pure and stable per argument.
pub type HomeFn = Arc<dyn Fn(&str) -> NodeId + Send + Sync>;

/// Reference worker kind: single-threaded actor with idle TTL
pub struct SimpleUnit {
    name: String,
    home: HomeFn,
    init: UnitInitFn,
    ttl: Duration,
}

impl SimpleUnit {
    pub fn new(
        name: impl Into<String>,
        home: impl Fn(&str) -> NodeId + Send + Sync + 'static,
        init: impl Fn(&str) -> Result<UnitState, PipelineError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            home: Arc::new(home),
            init: Arc::new(init),
            ttl: Duration::ZERO,
        }
    }

    /// A kind whose workers all live on one fixed node
    pub fn pinned(
        name: impl Into<String>,
        node: NodeId,
        init: impl Fn(&str) -> Result<UnitState, PipelineError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, move |_arg| node.clone(), init)
    }

    /// Set the idle TTL; zero disables expiry
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[async_trait]
impl UnitKind for SimpleUnit {
    fn kind_name(&self) -> &str {
        &self.name
    }

    fn home_node(&self, arg: &str) -> NodeId {
        (self.home)(arg)
    }

    #[instrument(name = "simple_unit_start", skip(self), fields(kind = %self.name))]
    async fn start(&self, arg: &str) -> Result<WorkerHandle, PipelineError> {
        let state = (self.init)(arg)?;
        Ok(spawn_worker(state, self.ttl, format!("{}/{arg}", self.name)))
    }
}

/// Spawn the worker actor around already-constructed state
///
/// The exit signal fires when the loop ends for any reason, panic included:
/// the sender lives on the task's stack and drops with it.
pub fn spawn_worker(state: UnitState, ttl: Duration, label: String) -> WorkerHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<contracts::UnitTask>();
    let (exit_tx, exit_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let _exit = exit_tx;
        let mut state = state;
        debug!(unit = %label, ttl_ms = ttl.as_millis() as u64, "worker started");

        loop {
            let task: Option<_> = if ttl.is_zero() {
                rx.recv().await
            } else {
                match timeout(ttl, rx.recv()).await {
                    Ok(task) => task,
                    Err(_) => {
                        debug!(unit = %label, "idle ttl expired");
                        break;
                    }
                }
            };

            match task {
                Some(task) => task(&mut state),
                None => break,
            }
        }

        debug!(unit = %label, "worker stopped");
    });

    WorkerHandle::new(tx, exit_rx)
}
