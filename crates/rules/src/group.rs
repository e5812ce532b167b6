//! Rule groups
//!
//! An ordered list of rules sharing a type-tag filter and an entry hook.
//! Entering a group runs `init` against the current element with the
//! group's fixed args and resets the apply-map.

use std::sync::Arc;

use serde_json::Value;

use contracts::Element;

use crate::rule::Rule;

/// Group entry hook: `(element, args) -> (element, rule_state)`
pub type InitFn = Arc<dyn Fn(Element, &Value) -> (Element, Value) + Send + Sync>;

/// Ordered rules behind one type-tag filter
pub struct RuleGroup {
    tag: String,
    args: Value,
    init: Option<InitFn>,
    rules: Vec<Rule>,
}

impl RuleGroup {
    pub fn new(tag: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            tag: tag.into(),
            args: Value::Null,
            init: None,
            rules,
        }
    }

    /// Attach an entry hook
    pub fn with_init(
        mut self,
        init: impl Fn(Element, &Value) -> (Element, Value) + Send + Sync + 'static,
    ) -> Self {
        self.init = Some(Arc::new(init));
        self
    }

    /// Fix the args handed to the entry hook
    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Run the entry hook (identity element, null state by default)
    pub(crate) fn enter(&self, element: Element) -> (Element, Value) {
        match &self.init {
            Some(init) => init(element, &self.args),
            None => (element, Value::Null),
        }
    }
}

impl std::fmt::Debug for RuleGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleGroup")
            .field("tag", &self.tag)
            .field("rules", &self.rules.len())
            .finish()
    }
}
