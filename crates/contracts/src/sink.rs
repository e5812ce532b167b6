//! Sink messages, delivery routes, and the element obligation guard
//!
//! The sink actor itself lives in the `stream` crate; its message surface is
//! contract because completions and emissions originate on arbitrary nodes.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::{Element, NodeCtx, NodeMsg, PipelineError, SinkRef, UnitSpec, UnitTask};

/// Reply to a consumer pull
pub enum ChunkReply {
    /// Completed elements, at most `chunk_size` of them
    Chunk(Vec<Element>),

    /// The stream has drained and no late work arrived
    Halt,
}

/// Messages accepted by a sink actor
pub enum SinkMsg {
    /// Consumer pull; parked until a chunk is ready or the stream halts
    Next { reply: oneshot::Sender<ChunkReply> },

    /// Inject elements as a new emitter using the sink's default emit routine
    InjectElems(Vec<Element>),

    /// Register an externally-constructed emitter as-is
    RegisterEmitter(Emitter),

    /// One completed element
    Done(Element),

    /// One launched element's obligation settled (`completed` false means
    /// the element's task aborted before finishing)
    TaskFinished { completed: bool },

    /// Consumer abandoned the stream; tear down best-effort
    Shutdown,
}

/// A per-element emit routine, run as its own task for every element an
/// emitter launches. The default routine of a pipeline run is generated by
/// the rule engine; callers can supply their own.
#[async_trait]
pub trait EmitFn: Send + Sync {
    async fn emit(&self, scope: &EmitScope, element: Element) -> Result<(), PipelineError>;
}

/// Lazy producer bound to a source sequence
///
/// The owning sink drives the source synchronously and launches each pulled
/// item's emit routine as an independent task. An emitter without its own
/// routine uses the sink's default.
pub struct Emitter {
    pub source: Box<dyn Iterator<Item = Element> + Send>,
    pub emit_fn: Option<std::sync::Arc<dyn EmitFn>>,
}

impl Emitter {
    /// Emitter over an arbitrary finite-or-infinite sequence
    pub fn from_source(source: impl Iterator<Item = Element> + Send + 'static) -> Self {
        Self {
            source: Box::new(source),
            emit_fn: None,
        }
    }

    /// Emitter over a fixed list of elements
    pub fn from_elems(elems: Vec<Element>) -> Self {
        Self::from_source(elems.into_iter())
    }

    /// Attach a dedicated emit routine
    pub fn with_emit_fn(mut self, emit_fn: std::sync::Arc<dyn EmitFn>) -> Self {
        self.emit_fn = Some(emit_fn);
        self
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("dedicated_emit_fn", &self.emit_fn.is_some())
            .finish()
    }
}

/// Delivery route from any node back to a sink
#[derive(Clone)]
pub enum SinkRoute {
    /// Sink homed on the current node
    Local(mpsc::UnboundedSender<SinkMsg>),

    /// Sink homed on another node; messages travel the inter-node link
    Linked {
        link: mpsc::UnboundedSender<NodeMsg>,
        target: SinkRef,
    },

    /// Sink or node is gone; sends drop silently
    Dead,
}

impl SinkRoute {
    pub fn done(&self, element: Element) {
        match self {
            SinkRoute::Local(tx) => {
                let _ = tx.send(SinkMsg::Done(element));
            }
            SinkRoute::Linked { link, target } => {
                let _ = link.send(NodeMsg::SinkDone {
                    sink: target.sink,
                    element,
                });
            }
            SinkRoute::Dead => trace!("dropping completion for dead sink"),
        }
    }

    pub fn emit(&self, elements: Vec<Element>) {
        if elements.is_empty() {
            return;
        }
        match self {
            SinkRoute::Local(tx) => {
                let _ = tx.send(SinkMsg::InjectElems(elements));
            }
            SinkRoute::Linked { link, target } => {
                let _ = link.send(NodeMsg::SinkEmit {
                    sink: target.sink,
                    elements,
                });
            }
            SinkRoute::Dead => trace!("dropping emission for dead sink"),
        }
    }

    fn finished(&self, completed: bool) {
        match self {
            SinkRoute::Local(tx) => {
                let _ = tx.send(SinkMsg::TaskFinished { completed });
            }
            SinkRoute::Linked { link, target } => {
                let _ = link.send(NodeMsg::SinkFinished {
                    sink: target.sink,
                    completed,
                });
            }
            SinkRoute::Dead => {}
        }
    }
}

/// RAII obligation carried by every launched element
///
/// The sink counts an element as in flight from launch until the guard
/// settles. Dropping an unsettled guard reports an abort, so crashed rule
/// actions, dead workers and dropped task queues all release their slot
/// instead of stalling the stream. A traversal that hops to another node
/// transfers the obligation: the origin guard is disarmed only after the
/// hop is on the wire, and the target node arms a fresh one on receipt.
pub struct TaskGuard {
    route: SinkRoute,
    armed: bool,
    completed: bool,
}

impl TaskGuard {
    pub fn new(route: SinkRoute) -> Self {
        Self {
            route,
            armed: true,
            completed: false,
        }
    }

    /// Settle the obligation as completed
    pub fn finish(mut self) {
        self.completed = true;
    }

    /// Disarm without settling; the obligation now lives elsewhere
    pub fn transfer(mut self) {
        self.armed = false;
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.armed {
            self.route.finished(self.completed);
        }
    }
}

/// Capability handed to an emit routine
///
/// Carries the node context, the sink address, and the element's obligation
/// guard. `done` / `emit` are callable from any node the element reaches.
pub struct EmitScope {
    node: NodeCtx,
    sink: SinkRef,
    route: SinkRoute,
    obligation: Mutex<Option<TaskGuard>>,
}

impl EmitScope {
    /// Build a scope with a freshly armed obligation for `sink`
    pub fn new(node: NodeCtx, sink: SinkRef) -> Self {
        let route = node.sink_route(&sink);
        let obligation = Mutex::new(Some(TaskGuard::new(route.clone())));
        Self {
            node,
            sink,
            route,
            obligation,
        }
    }

    pub fn node(&self) -> &NodeCtx {
        &self.node
    }

    pub fn sink_ref(&self) -> &SinkRef {
        &self.sink
    }

    /// Deliver one completed element
    pub fn done(&self, element: Element) {
        self.route.done(element);
    }

    /// Inject additional elements into the stream
    pub fn emit(&self, elements: Vec<Element>) {
        self.route.emit(elements);
    }

    /// Route a task to a worker, from whichever node this scope lives on
    pub async fn cast(&self, spec: UnitSpec, task: UnitTask) -> Result<(), PipelineError> {
        self.node.cast(spec, task).await
    }

    /// Take the element obligation out of the scope (hop transfer)
    pub fn take_obligation(&self) -> Option<TaskGuard> {
        self.obligation.lock().expect("obligation poisoned").take()
    }

    /// Settle the obligation if it is still held here
    pub fn settle(&self, completed: bool) {
        if let Some(guard) = self.take_obligation() {
            if completed {
                guard.finish();
            }
        }
    }
}

impl std::fmt::Debug for EmitScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmitScope")
            .field("node", self.node.id())
            .field("sink", &self.sink)
            .finish()
    }
}
