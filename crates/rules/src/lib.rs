//! # Rules
//!
//! The matching-rule engine. Rules are ordinary values: named matcher/action
//! pairs collected into tag-filtered groups and named pipelines. Applying a
//! pipeline to an element walks the groups with at-most-once-per-rule
//! semantics, restarting the scan after every fire; remote rules suspend
//! the walk and resume it on the node that owns the data.

mod engine;
mod group;
mod pipeline;
mod rule;

pub use group::{InitFn, RuleGroup};
pub use pipeline::{PipelineDef, PipelineEmit};
pub use rule::{ActionFn, MatcherFn, Rule, UnitSpecFn};
