//! Rule values
//!
//! A rule is a named matcher/action pair. The action is either local (a
//! pure function over the element and rule state) or remote (a unit spec
//! plus the name of a continuation registered on every node).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;

use contracts::{Element, PipelineError, RuleOutcome, UnitSpec};

/// Predicate over `(element, rule_state)`
pub type MatcherFn = Arc<dyn Fn(&Element, &Value) -> bool + Send + Sync>;

/// Local rule action
pub type ActionFn = Arc<dyn Fn(Element, Value) -> Result<RuleOutcome, PipelineError> + Send + Sync>;

/// Computes the worker spec a remote rule needs
pub type UnitSpecFn = Arc<dyn Fn(&Element, &Value) -> UnitSpec + Send + Sync>;

/// A named rule
pub struct Rule {
    name: String,
    matcher: MatcherFn,
    action: RuleAction,
}

pub(crate) enum RuleAction {
    Local(ActionFn),
    Remote { spec: UnitSpecFn, handler: String },
}

impl Rule {
    /// A rule whose action runs in place
    pub fn local(
        name: impl Into<String>,
        matcher: impl Fn(&Element, &Value) -> bool + Send + Sync + 'static,
        action: impl Fn(Element, Value) -> Result<RuleOutcome, PipelineError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            matcher: Arc::new(matcher),
            action: RuleAction::Local(Arc::new(action)),
        }
    }

    /// A rule whose continuation runs on the worker identified by `spec`,
    /// under the handler registered as `handler` on every node
    pub fn remote(
        name: impl Into<String>,
        matcher: impl Fn(&Element, &Value) -> bool + Send + Sync + 'static,
        spec: impl Fn(&Element, &Value) -> UnitSpec + Send + Sync + 'static,
        handler: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            matcher: Arc::new(matcher),
            action: RuleAction::Remote {
                spec: Arc::new(spec),
                handler: handler.into(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate the matcher; a panicking matcher counts as a non-match
    pub(crate) fn matches(&self, element: &Element, state: &Value) -> bool {
        catch_unwind(AssertUnwindSafe(|| (self.matcher)(element, state))).unwrap_or(false)
    }

    pub(crate) fn action(&self) -> &RuleAction {
        &self.action
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.action {
            RuleAction::Local(_) => "local",
            RuleAction::Remote { .. } => "remote",
        };
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}
