//! Rule outcome and remote-handler contract
//!
//! Remote rule continuations cannot cross node boundaries as closures, so
//! they are registered by name on every node and referenced by that name in
//! hop requests. A handler runs on the worker's node against the worker's
//! state and yields the same outcome shape a local rule action does.

use std::sync::Arc;

use serde_json::Value;

use crate::{Element, PipelineError, UnitState};

/// Result of firing a rule (local action or remote handler)
pub enum RuleOutcome {
    /// Replace the current element
    Replace(Element),

    /// Emit additional elements, keep the current element
    Emit(Vec<Element>),

    /// Emit additional elements and replace the current element
    EmitReplace(Vec<Element>, Element),

    /// Update the per-element rule state, keep the current element
    SetState(Value),
}

/// A named remote continuation: `(worker_state, element, rule_state)` on the
/// worker's home node.
pub type HandlerFn =
    Arc<dyn Fn(&mut UnitState, &Element, &Value) -> Result<RuleOutcome, PipelineError> + Send + Sync>;
