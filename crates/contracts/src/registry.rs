//! Shared registries: pipelines, remote handlers, unit kinds
//!
//! Everything a hop needs to resume a traversal from wire data is looked up
//! by name here. The same registry set is installed on every node; names are
//! the only thing that crosses the wire.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::{EmitScope, HandlerFn, HopRequest, NodeCtx, PipelineError, UnitKind};

/// A registered pipeline, able to resume a hopped traversal on this node
///
/// Implemented by the rule engine's pipeline definition. The scope already
/// carries the element's obligation; an implementation that cannot resume
/// (missing handler, dead worker) just drops it.
pub trait HopHandler: Send + Sync {
    fn pipeline_name(&self) -> &str;

    /// Run the hop's continuation against its worker and resume the rule
    /// scan on `node`.
    fn resume_hop(self: Arc<Self>, node: NodeCtx, scope: EmitScope, hop: HopRequest);
}

/// Name-keyed registries shared by every node
#[derive(Default)]
pub struct Registries {
    pipelines: RwLock<HashMap<String, Arc<dyn HopHandler>>>,
    handlers: RwLock<HashMap<String, HandlerFn>>,
    kinds: RwLock<HashMap<String, Arc<dyn UnitKind>>>,
}

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pipeline under its own name
    pub fn register_pipeline(&self, pipeline: Arc<dyn HopHandler>) {
        self.pipelines
            .write()
            .expect("pipeline registry poisoned")
            .insert(pipeline.pipeline_name().to_string(), pipeline);
    }

    pub fn pipeline(&self, name: &str) -> Result<Arc<dyn HopHandler>, PipelineError> {
        self.pipelines
            .read()
            .expect("pipeline registry poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownPipeline {
                pipeline: name.to_string(),
            })
    }

    /// Register a remote continuation under `name`
    pub fn register_handler(&self, name: impl Into<String>, handler: HandlerFn) {
        self.handlers
            .write()
            .expect("handler registry poisoned")
            .insert(name.into(), handler);
    }

    pub fn handler(&self, name: &str) -> Result<HandlerFn, PipelineError> {
        self.handlers
            .read()
            .expect("handler registry poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownHandler {
                handler: name.to_string(),
            })
    }

    /// Register a unit kind under its own name
    pub fn register_unit_kind(&self, kind: Arc<dyn UnitKind>) {
        self.kinds
            .write()
            .expect("kind registry poisoned")
            .insert(kind.kind_name().to_string(), kind);
    }

    pub fn unit_kind(&self, name: &str) -> Result<Arc<dyn UnitKind>, PipelineError> {
        self.kinds
            .read()
            .expect("kind registry poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownUnitKind {
                kind: name.to_string(),
            })
    }
}

impl std::fmt::Debug for Registries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registries")
            .field(
                "pipelines",
                &self.pipelines.read().expect("pipeline registry poisoned").len(),
            )
            .field(
                "handlers",
                &self.handlers.read().expect("handler registry poisoned").len(),
            )
            .field("kinds", &self.kinds.read().expect("kind registry poisoned").len())
            .finish()
    }
}
