//! # Cluster
//!
//! Named-node topology with bidirectional in-process links. One runtime
//! actor and one unit router per node; pipelines, remote handlers and unit
//! kinds are registered by name on every node so traversals can hop between
//! nodes as pure data.

mod builder;
mod runtime;

pub use builder::{Cluster, ClusterBuilder};
