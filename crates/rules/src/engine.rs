//! The rule traversal
//!
//! Walks a pipeline's groups over one element. Within a group the scan
//! restarts from the top after every fire, so a later rule can enable an
//! earlier one; the apply-map keeps every rule to at most one fire per
//! group entry. A remote rule suspends the walk and ships it to the
//! worker's home node as data.

use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use contracts::{Element, EmitScope, HopRequest, PipelineError, RuleOutcome};
use observability::{record_hop, record_rule_fired};

use crate::pipeline::PipelineDef;
use crate::rule::RuleAction;

/// Where a traversal stopped on this node
pub(crate) enum TraversalEnd {
    /// All groups exhausted; the element was delivered
    Completed,
    /// Suspended into a hop; another node owns the element now
    Hopped,
}

/// Scan position shipped inside a hop
pub(crate) struct ResumePoint {
    pub group: usize,
    pub applied: Vec<bool>,
    pub state: Value,
}

/// Interpret one rule outcome against the current element and state
pub(crate) fn apply_outcome(
    outcome: RuleOutcome,
    element: &mut Element,
    state: &mut Value,
    scope: &EmitScope,
) {
    match outcome {
        RuleOutcome::Replace(next) => *element = next,
        RuleOutcome::Emit(extra) => scope.emit(extra),
        RuleOutcome::EmitReplace(extra, next) => {
            scope.emit(extra);
            *element = next;
        }
        RuleOutcome::SetState(next) => *state = next,
    }
}

/// Run the traversal from the start, or from a hop's resume point
///
/// Completion delivers the element through the scope. A hop transfers the
/// element's obligation to the target node before returning.
pub(crate) fn traverse(
    scope: &EmitScope,
    pipeline: &Arc<PipelineDef>,
    mut element: Element,
    resume: Option<ResumePoint>,
) -> Result<TraversalEnd, PipelineError> {
    let groups = pipeline.groups();
    let (mut group_idx, mut resumed) = match resume {
        Some(point) => (point.group, Some((point.applied, point.state))),
        None => (0, None),
    };

    while group_idx < groups.len() {
        let group = &groups[group_idx];

        // A resumed walk is already inside its group; a fresh entry runs
        // the group hook and resets the apply-map.
        let (mut applied, mut state) = match resumed.take() {
            Some(entry) => entry,
            None => {
                if group.tag() != element.tag {
                    group_idx += 1;
                    continue;
                }
                let (entered, state) = group.enter(element);
                element = entered;
                (vec![false; group.rules().len()], state)
            }
        };

        'scan: loop {
            for (idx, rule) in group.rules().iter().enumerate() {
                if applied[idx] || !rule.matches(&element, &state) {
                    continue;
                }

                match rule.action() {
                    RuleAction::Local(action) => {
                        let outcome = action(element.clone(), state.clone())
                            .map_err(|e| PipelineError::rule(rule.name(), e.to_string()))?;
                        applied[idx] = true;
                        apply_outcome(outcome, &mut element, &mut state, scope);
                        record_rule_fired(rule.name());
                        trace!(rule = rule.name(), "local rule fired");
                        continue 'scan;
                    }
                    RuleAction::Remote { spec, handler } => {
                        applied[idx] = true;
                        record_rule_fired(rule.name());
                        let spec = spec(&element, &state);
                        let hop = HopRequest {
                            pipeline: pipeline.name().to_string(),
                            group: group_idx,
                            applied,
                            element,
                            state,
                            spec,
                            handler: handler.clone(),
                            sink: scope.sink_ref().clone(),
                        };
                        dispatch_hop(scope, hop)?;
                        return Ok(TraversalEnd::Hopped);
                    }
                }
            }
            break 'scan;
        }

        group_idx += 1;
    }

    scope.done(element);
    Ok(TraversalEnd::Completed)
}

/// Ship a suspended walk to the worker's home node
///
/// The element obligation transfers only once the hop is on the wire; any
/// failure before that leaves the local guard armed, which reports the
/// abort.
fn dispatch_hop(scope: &EmitScope, hop: HopRequest) -> Result<(), PipelineError> {
    let home = scope.node().home_node_of(&hop.spec)?;
    trace!(spec = %hop.spec, node = %home, "rule walk hopping");
    scope.node().send_hop(&home, hop)?;
    record_hop(home.as_str());
    if let Some(guard) = scope.take_obligation() {
        guard.transfer();
    }
    Ok(())
}
