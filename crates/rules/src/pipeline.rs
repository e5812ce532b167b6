//! Pipeline definitions
//!
//! A pipeline is a named, ordered list of rule groups. Registered by name
//! on every node, it doubles as the hop handler that resumes suspended
//! traversals arriving from other nodes.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use contracts::{
    Element, EmitFn, EmitScope, HopHandler, HopRequest, NodeCtx, PipelineError, UnitState,
    UnitTask,
};

use crate::engine::{self, ResumePoint};
use crate::group::RuleGroup;

/// Named, ordered rule groups
pub struct PipelineDef {
    name: String,
    groups: Vec<RuleGroup>,
}

impl PipelineDef {
    /// Define a pipeline; register it on the cluster to make it hoppable
    pub fn define(name: impl Into<String>, groups: Vec<RuleGroup>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            groups,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn groups(&self) -> &[RuleGroup] {
        &self.groups
    }
}

impl std::fmt::Debug for PipelineDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDef")
            .field("name", &self.name)
            .field("groups", &self.groups.len())
            .finish()
    }
}

/// Per-element emit routine generated from a pipeline definition
pub struct PipelineEmit {
    def: Arc<PipelineDef>,
}

impl PipelineEmit {
    /// The emit routine driving `def`, for `ElementStream::start`
    pub fn new(def: &Arc<PipelineDef>) -> Arc<Self> {
        Arc::new(Self {
            def: Arc::clone(def),
        })
    }
}

#[async_trait]
impl EmitFn for PipelineEmit {
    async fn emit(&self, scope: &EmitScope, element: Element) -> Result<(), PipelineError> {
        engine::traverse(scope, &self.def, element, None)?;
        Ok(())
    }
}

impl HopHandler for PipelineDef {
    fn pipeline_name(&self) -> &str {
        &self.name
    }

    /// Resume a suspended walk arriving on this node
    ///
    /// Builds the worker task from the named continuation, casts it to the
    /// local router, and lets the task spawn the rest of the walk once the
    /// continuation has run. The scope travels into the task; every failure
    /// path drops it, which settles the element as aborted.
    fn resume_hop(self: Arc<Self>, node: NodeCtx, scope: EmitScope, hop: HopRequest) {
        let handler = match node.registries().handler(&hop.handler) {
            Ok(handler) => handler,
            Err(e) => {
                warn!(node = %node.id(), error = %e, "hop names an unregistered handler");
                return;
            }
        };

        let def = self;
        let spec = hop.spec.clone();
        let router = node.router().clone();

        let task: UnitTask = Box::new(move |worker_state: &mut UnitState| {
            let HopRequest {
                group,
                applied,
                element,
                state,
                ..
            } = hop;
            let mut element = element;
            let mut state = state;

            match handler(worker_state, &element, &state) {
                Ok(outcome) => {
                    engine::apply_outcome(outcome, &mut element, &mut state, &scope);
                    let resume = ResumePoint {
                        group,
                        applied,
                        state,
                    };
                    // The walk continues on this node, outside the worker's
                    // own execution context.
                    tokio::spawn(async move {
                        match engine::traverse(&scope, &def, element, Some(resume)) {
                            Ok(_) => scope.settle(true),
                            Err(e) => {
                                warn!(error = %e, "resumed rule walk failed");
                                scope.settle(false);
                            }
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "remote continuation failed; element aborted");
                    drop(scope);
                }
            }
        });

        tokio::spawn(async move {
            if let Err(e) = router.cast(spec, task).await {
                warn!(error = %e, "hop cast failed; element aborted");
            }
        });
    }
}
