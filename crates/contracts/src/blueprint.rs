//! PipelineBlueprint - Config Loader output
//!
//! Describes a complete pipeline deployment: stream pacing, node topology,
//! unit kind defaults.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete pipeline configuration blueprint
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Stream pacing settings
    #[serde(default)]
    #[validate(nested)]
    pub stream: StreamSettings,

    /// Cluster topology
    #[validate(nested)]
    pub topology: TopologySettings,

    /// Per-kind worker settings
    #[serde(default)]
    #[validate(nested)]
    pub units: Vec<UnitSettings>,
}

/// Stream pacing: per-pull task budget and quiescence window
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StreamSettings {
    /// Element tasks launched per consumer pull
    #[serde(default = "default_chunk_size")]
    #[validate(range(min = 1, message = "chunk_size must be >= 1"))]
    pub chunk_size: usize,

    /// Quiet window after the last emitter drains before the stream halts
    #[serde(default = "default_done_timeout_ms")]
    pub done_timeout_ms: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            done_timeout_ms: default_done_timeout_ms(),
        }
    }
}

fn default_chunk_size() -> usize {
    200
}

fn default_done_timeout_ms() -> u64 {
    200
}

/// Named node set
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TopologySettings {
    /// Node names; the router is started once per node
    #[validate(length(min = 1, message = "topology needs at least one node"))]
    pub nodes: Vec<String>,
}

/// Worker settings for one unit kind
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UnitSettings {
    /// Kind name, matched against the kind registry
    #[validate(length(min = 1, message = "unit kind cannot be empty"))]
    pub kind: String,

    /// Idle TTL in milliseconds; 0 disables idle expiry
    #[serde(default)]
    pub ttl_ms: u64,
}
