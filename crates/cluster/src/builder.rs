//! Cluster construction and teardown
//!
//! A cluster is a named set of nodes with bidirectional links. Building it
//! spawns one runtime actor and one unit router per node and wires the link
//! table; the shared registries are installed on every node.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use contracts::{
    HandlerFn, HopHandler, NodeCtx, NodeId, NodeMsg, PipelineBlueprint, Registries, UnitKind,
};
use unit_router::{Router, RouterMetrics, RouterMetricsSnapshot};

use crate::runtime::NodeRuntime;

/// Builder for a cluster
pub struct ClusterBuilder {
    nodes: Vec<NodeId>,
    registries: Arc<Registries>,
}

impl ClusterBuilder {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            registries: Arc::new(Registries::new()),
        }
    }

    /// Take the node set from a parsed blueprint
    pub fn from_blueprint(blueprint: &PipelineBlueprint) -> Self {
        let mut builder = Self::new();
        for name in &blueprint.topology.nodes {
            builder = builder.node(name.as_str());
        }
        builder
    }

    /// Add a named node
    pub fn node(mut self, name: impl Into<NodeId>) -> Self {
        let id = name.into();
        if self.nodes.contains(&id) {
            warn!(node = %id, "duplicate node name ignored");
            return self;
        }
        self.nodes.push(id);
        self
    }

    /// Register a unit kind on every node
    pub fn register_unit_kind(self, kind: Arc<dyn UnitKind>) -> Self {
        self.registries.register_unit_kind(kind);
        self
    }

    /// Register a remote continuation by name on every node
    pub fn register_handler(self, name: impl Into<String>, handler: HandlerFn) -> Self {
        self.registries.register_handler(name, handler);
        self
    }

    /// Register a pipeline by name on every node
    pub fn register_pipeline(self, pipeline: Arc<dyn HopHandler>) -> Self {
        self.registries.register_pipeline(pipeline);
        self
    }

    /// The shared registries (for registration after build-time values exist)
    pub fn registries(&self) -> Arc<Registries> {
        Arc::clone(&self.registries)
    }

    /// Spawn runtimes and routers, wire links, return the running cluster
    #[instrument(name = "cluster_build", skip(self), fields(nodes = self.nodes.len()))]
    pub fn build(self) -> Cluster {
        let mut link_map = HashMap::new();
        let mut inboxes = Vec::new();
        for id in &self.nodes {
            let (tx, rx) = mpsc::unbounded_channel();
            link_map.insert(id.clone(), tx);
            inboxes.push((id.clone(), rx));
        }
        let links: contracts::NodeLinks = Arc::new(link_map);

        let mut nodes = HashMap::new();
        let mut router_metrics = HashMap::new();
        let mut runtimes = Vec::new();

        for (id, rx) in inboxes {
            let (router, metrics) = Router::spawn(id.clone(), Arc::clone(&self.registries));
            let ctx = NodeCtx::new(
                id.clone(),
                Arc::clone(&links),
                router,
                Arc::clone(&self.registries),
            );
            runtimes.push(tokio::spawn(NodeRuntime::new(ctx.clone()).run(rx)));
            router_metrics.insert(id.clone(), metrics);
            nodes.insert(id, ctx);
        }

        info!(nodes = nodes.len(), "cluster started");
        Cluster {
            nodes,
            links,
            router_metrics,
            runtimes,
            registries: self.registries,
        }
    }
}

impl Default for ClusterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running cluster of named nodes
pub struct Cluster {
    nodes: HashMap<NodeId, NodeCtx>,
    links: contracts::NodeLinks,
    router_metrics: HashMap<NodeId, Arc<RouterMetrics>>,
    runtimes: Vec<JoinHandle<()>>,
    registries: Arc<Registries>,
}

impl Cluster {
    /// Capability context for a node
    pub fn node(&self, name: impl Into<NodeId>) -> Option<NodeCtx> {
        self.nodes.get(&name.into()).cloned()
    }

    /// The registry set shared by every node
    pub fn registries(&self) -> Arc<Registries> {
        Arc::clone(&self.registries)
    }

    /// Router metrics snapshot for a node
    pub fn router_metrics(&self, name: impl Into<NodeId>) -> Option<RouterMetricsSnapshot> {
        self.router_metrics
            .get(&name.into())
            .map(|m| m.snapshot())
    }

    /// Stop routers (which stop their workers), then the node runtimes
    #[instrument(name = "cluster_shutdown", skip(self))]
    pub async fn shutdown(self) {
        for ctx in self.nodes.values() {
            ctx.router().shutdown().await;
        }
        for link in self.links.values() {
            let _ = link.send(NodeMsg::Shutdown);
        }
        for runtime in self.runtimes {
            if let Err(e) = runtime.await {
                warn!(error = ?e, "node runtime ended abnormally");
            }
        }
        debug!("cluster shutdown complete");
    }
}
