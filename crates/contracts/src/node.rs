//! Node identity, inter-node messages, and the per-node capability context
//!
//! The cluster is a named set of reachable nodes with bidirectional message
//! passing. Everything that crosses a node boundary is a `NodeMsg`; the
//! data-bearing payloads (`HopRequest`, elements, sink references) are plain
//! serialisable values so a real transport can replace the in-process links
//! behind the same boundary.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::{
    Element, PipelineError, RouterHandle, SinkMsg, SinkRoute, UnitSpec, UnitTask,
};

/// Name of a cluster node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Cluster-wide address of a sink: home node plus node-local id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkRef {
    pub node: NodeId,
    pub sink: u64,
}

/// A suspended rule traversal in flight to a worker's home node
///
/// Everything needed to resume the scan on the target node: the pipeline is
/// looked up by name there, the continuation by handler name, and the rule
/// just fired is already marked in `applied`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HopRequest {
    /// Registered pipeline name
    pub pipeline: String,

    /// Index of the rule group being scanned
    pub group: usize,

    /// Apply-map for the group, with the firing rule already set
    pub applied: Vec<bool>,

    /// Current element
    pub element: Element,

    /// Current per-element rule state
    pub state: Value,

    /// Worker to run the continuation against
    pub spec: UnitSpec,

    /// Registered continuation name
    pub handler: String,

    /// Where completions and emissions go
    pub sink: SinkRef,
}

/// Messages carried on inter-node links
///
/// `Hop` and the `Sink*` variants are pure data. `Cast` carries a live task
/// closure and therefore only exists on the in-process link implementation;
/// rule traversals never use it (they hop as data and rebuild the task from
/// the handler registry on the target node).
pub enum NodeMsg {
    /// Resume a rule traversal on this node
    Hop(HopRequest),

    /// Forwarded `cast` from another node for a worker homed here
    Cast {
        spec: UnitSpec,
        task: UnitTask,
        reply: oneshot::Sender<Result<(), PipelineError>>,
    },

    /// Completed element for a sink homed on this node
    SinkDone { sink: u64, element: Element },

    /// Injected elements for a sink homed on this node
    SinkEmit { sink: u64, elements: Vec<Element> },

    /// Element obligation settled for a sink homed on this node
    SinkFinished { sink: u64, completed: bool },

    /// Stop this node's runtime
    Shutdown,
}

/// Links to every node runtime in the cluster (self included)
pub type NodeLinks = Arc<HashMap<NodeId, mpsc::UnboundedSender<NodeMsg>>>;

/// Node-local registry of live sinks
pub type SinkTable = Arc<RwLock<HashMap<u64, mpsc::UnboundedSender<SinkMsg>>>>;

/// Per-node capability context
///
/// Cheap to clone; handed to element tasks, emit routines and hop
/// continuations. Gives access to the local router, the inter-node links,
/// the shared registries and the node-local sink table.
#[derive(Clone)]
pub struct NodeCtx {
    id: NodeId,
    links: NodeLinks,
    router: RouterHandle,
    registries: Arc<crate::Registries>,
    sinks: SinkTable,
    sink_seq: Arc<AtomicU64>,
}

impl NodeCtx {
    pub fn new(
        id: NodeId,
        links: NodeLinks,
        router: RouterHandle,
        registries: Arc<crate::Registries>,
    ) -> Self {
        Self {
            id,
            links,
            router,
            registries,
            sinks: Arc::new(RwLock::new(HashMap::new())),
            sink_seq: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn router(&self) -> &RouterHandle {
        &self.router
    }

    pub fn registries(&self) -> &Arc<crate::Registries> {
        &self.registries
    }

    /// Register a sink homed on this node; returns its cluster-wide address
    pub fn register_sink(&self, tx: mpsc::UnboundedSender<SinkMsg>) -> SinkRef {
        let id = self.sink_seq.fetch_add(1, Ordering::Relaxed);
        self.sinks
            .write()
            .expect("sink table poisoned")
            .insert(id, tx);
        SinkRef {
            node: self.id.clone(),
            sink: id,
        }
    }

    /// Remove a sink from the local table
    pub fn unregister_sink(&self, sink: u64) {
        self.sinks
            .write()
            .expect("sink table poisoned")
            .remove(&sink);
    }

    /// Look up a sink homed on this node
    pub fn local_sink(&self, sink: u64) -> Option<mpsc::UnboundedSender<SinkMsg>> {
        self.sinks
            .read()
            .expect("sink table poisoned")
            .get(&sink)
            .cloned()
    }

    /// Build the delivery route for a sink address
    ///
    /// A reference to a sink that no longer exists (or a node outside the
    /// topology) yields a dead route: sends drop silently, matching
    /// abandoned-consumer semantics.
    pub fn sink_route(&self, sink: &SinkRef) -> SinkRoute {
        if sink.node == self.id {
            match self.local_sink(sink.sink) {
                Some(tx) => SinkRoute::Local(tx),
                None => SinkRoute::Dead,
            }
        } else {
            match self.links.get(&sink.node) {
                Some(link) => SinkRoute::Linked {
                    link: link.clone(),
                    target: sink.clone(),
                },
                None => SinkRoute::Dead,
            }
        }
    }

    /// Link to another node's runtime
    pub fn link(&self, node: &NodeId) -> Option<mpsc::UnboundedSender<NodeMsg>> {
        self.links.get(node).cloned()
    }

    /// Home node of a unit spec, via the kind registry
    pub fn home_node_of(&self, spec: &UnitSpec) -> Result<NodeId, PipelineError> {
        let kind = self.registries.unit_kind(&spec.kind)?;
        Ok(kind.home_node(&spec.arg))
    }

    /// Route a task to the live worker for `spec`, wherever it is homed
    ///
    /// Resolves the home node, forwards to the router instance there, and
    /// reports worker start failures synchronously.
    pub async fn cast(&self, spec: UnitSpec, task: UnitTask) -> Result<(), PipelineError> {
        let home = self.home_node_of(&spec)?;
        if home == self.id {
            return self.router.cast(spec, task).await;
        }

        let link = self
            .link(&home)
            .ok_or_else(|| PipelineError::unreachable(&home))?;
        let (reply, rx) = oneshot::channel();
        link.send(NodeMsg::Cast { spec, task, reply })
            .map_err(|_| PipelineError::unreachable(&home))?;
        rx.await.map_err(|_| PipelineError::unreachable(&home))?
    }

    /// Send a hop request to the runtime on `home`
    pub fn send_hop(&self, home: &NodeId, hop: HopRequest) -> Result<(), PipelineError> {
        let link = self
            .link(home)
            .ok_or_else(|| PipelineError::unreachable(home))?;
        link.send(NodeMsg::Hop(hop))
            .map_err(|_| PipelineError::unreachable(home))
    }
}

impl fmt::Debug for NodeCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeCtx").field("id", &self.id).finish()
    }
}
