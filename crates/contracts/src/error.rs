//! Error layering
//!
//! Layered by source: config / registry / rule / worker / node / sink

use thiserror::Error;

use crate::{NodeId, UnitSpec};

/// Unified error type
#[derive(Debug, Error)]
pub enum PipelineError {
    // ===== Config errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Registry errors =====
    /// Unit kind not registered on this node
    #[error("unknown unit kind: {kind}")]
    UnknownUnitKind { kind: String },

    /// Remote handler not registered on this node
    #[error("unknown remote handler: {handler}")]
    UnknownHandler { handler: String },

    /// Pipeline not registered on this node
    #[error("unknown pipeline: {pipeline}")]
    UnknownPipeline { pipeline: String },

    // ===== Rule errors =====
    /// A rule action failed; the element's traversal aborts
    #[error("rule '{rule}' failed: {message}")]
    Rule { rule: String, message: String },

    // ===== Worker errors =====
    /// Worker construction failed
    #[error("worker start failed for {spec}: {message}")]
    WorkerStart { spec: UnitSpec, message: String },

    /// Worker died with deliveries outstanding
    #[error("worker lost for {spec}")]
    WorkerLost { spec: UnitSpec },

    // ===== Node errors =====
    /// Target node of a cast or hop is not reachable
    #[error("node unreachable: {node}")]
    NodeUnreachable { node: NodeId },

    // ===== Sink errors =====
    /// The sink shut down while work was still addressed to it
    #[error("sink closed")]
    SinkClosed,

    // ===== Generic errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Create a config parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a rule failure
    pub fn rule(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rule {
            rule: rule.into(),
            message: message.into(),
        }
    }

    /// Create a worker start failure
    pub fn worker_start(spec: &UnitSpec, message: impl Into<String>) -> Self {
        Self::WorkerStart {
            spec: spec.clone(),
            message: message.into(),
        }
    }

    /// Create a node-unreachable error
    pub fn unreachable(node: &NodeId) -> Self {
        Self::NodeUnreachable { node: node.clone() }
    }

    /// Create an untyped error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}
