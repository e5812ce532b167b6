//! Config validation
//!
//! Validation rules:
//! - chunk_size >= 1
//! - node names non-empty and unique
//! - unit kinds unique

use std::collections::HashSet;

use contracts::{PipelineBlueprint, PipelineError};

/// Validate a PipelineBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &PipelineBlueprint) -> Result<(), PipelineError> {
    validate_stream(blueprint)?;
    validate_topology(blueprint)?;
    validate_units(blueprint)?;
    Ok(())
}

fn validate_stream(blueprint: &PipelineBlueprint) -> Result<(), PipelineError> {
    if blueprint.stream.chunk_size < 1 {
        return Err(PipelineError::config_validation(
            "stream.chunk_size",
            format!("chunk_size must be >= 1, got {}", blueprint.stream.chunk_size),
        ));
    }
    Ok(())
}

fn validate_topology(blueprint: &PipelineBlueprint) -> Result<(), PipelineError> {
    if blueprint.topology.nodes.is_empty() {
        return Err(PipelineError::config_validation(
            "topology.nodes",
            "topology needs at least one node",
        ));
    }

    let mut seen = HashSet::new();
    for (idx, node) in blueprint.topology.nodes.iter().enumerate() {
        if node.is_empty() {
            return Err(PipelineError::config_validation(
                format!("topology.nodes[{idx}]"),
                "node name cannot be empty",
            ));
        }
        if !seen.insert(node) {
            return Err(PipelineError::config_validation(
                format!("topology.nodes[{idx}]"),
                format!("duplicate node name '{node}'"),
            ));
        }
    }
    Ok(())
}

fn validate_units(blueprint: &PipelineBlueprint) -> Result<(), PipelineError> {
    let mut seen = HashSet::new();
    for (idx, unit) in blueprint.units.iter().enumerate() {
        if unit.kind.is_empty() {
            return Err(PipelineError::config_validation(
                format!("units[{idx}].kind"),
                "unit kind cannot be empty",
            ));
        }
        if !seen.insert(&unit.kind) {
            return Err(PipelineError::config_validation(
                format!("units[{idx}]"),
                format!("duplicate unit kind '{}'", unit.kind),
            ));
        }
    }
    Ok(())
}
