//! # Contracts
//!
//! Frozen interface contracts (ICD), defining inter-crate data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Flow Model
//! - Elements are tagged key/value payloads; rules pattern-match on them
//! - Everything crossing a node boundary is data; continuations are
//!   registered by name on every node

mod blueprint;
mod element;
mod error;
mod node;
mod registry;
mod router;
mod rule;
mod sink;
mod unit;

pub use blueprint::*;
pub use element::{Element, Payload};
pub use error::PipelineError;
pub use node::{HopRequest, NodeCtx, NodeId, NodeLinks, NodeMsg, SinkRef, SinkTable};
pub use registry::{HopHandler, Registries};
pub use router::{RouterHandle, RouterMsg};
pub use rule::{HandlerFn, RuleOutcome};
pub use sink::{ChunkReply, EmitFn, EmitScope, Emitter, SinkMsg, SinkRoute, TaskGuard};
pub use unit::{UnitKind, UnitSpec, UnitState, UnitTask, WorkerHandle};
