//! Node runtime - one long-lived actor per node
//!
//! Receives everything addressed to the node: hop requests to resume rule
//! traversals, forwarded casts for workers homed here, and sink deliveries
//! for sinks homed here.

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use contracts::{EmitScope, HopRequest, NodeCtx, NodeMsg, SinkMsg};

pub(crate) struct NodeRuntime {
    ctx: NodeCtx,
}

impl NodeRuntime {
    pub(crate) fn new(ctx: NodeCtx) -> Self {
        Self { ctx }
    }

    pub(crate) async fn run(self, mut rx: mpsc::UnboundedReceiver<NodeMsg>) {
        debug!(node = %self.ctx.id(), "node runtime started");

        while let Some(msg) = rx.recv().await {
            match msg {
                NodeMsg::Hop(hop) => self.handle_hop(hop),
                NodeMsg::Cast { spec, task, reply } => {
                    // Worker start can take a while; never block the runtime.
                    let router = self.ctx.router().clone();
                    tokio::spawn(async move {
                        let _ = reply.send(router.cast(spec, task).await);
                    });
                }
                NodeMsg::SinkDone { sink, element } => {
                    self.forward(sink, SinkMsg::Done(element));
                }
                NodeMsg::SinkEmit { sink, elements } => {
                    self.forward(sink, SinkMsg::InjectElems(elements));
                }
                NodeMsg::SinkFinished { sink, completed } => {
                    self.forward(sink, SinkMsg::TaskFinished { completed });
                }
                NodeMsg::Shutdown => break,
            }
        }

        debug!(node = %self.ctx.id(), "node runtime stopped");
    }

    /// Resume a hopped traversal on this node
    ///
    /// The scope is built first so the element's obligation is armed here
    /// before anything can fail; an unresolvable pipeline then aborts the
    /// element instead of leaking its slot.
    fn handle_hop(&self, hop: HopRequest) {
        let scope = EmitScope::new(self.ctx.clone(), hop.sink.clone());
        match self.ctx.registries().pipeline(&hop.pipeline) {
            Ok(pipeline) => pipeline.resume_hop(self.ctx.clone(), scope, hop),
            Err(e) => {
                warn!(node = %self.ctx.id(), error = %e, "cannot resume hop; aborting element");
                drop(scope);
            }
        }
    }

    fn forward(&self, sink: u64, msg: SinkMsg) {
        match self.ctx.local_sink(sink) {
            Some(tx) => {
                let _ = tx.send(msg);
            }
            None => trace!(node = %self.ctx.id(), sink, "sink gone; dropping message"),
        }
    }
}
