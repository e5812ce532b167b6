//! # Stream
//!
//! The demand-driven stream engine: a sink actor multiplexing lazy emitters
//! into consumer-pulled chunks. Slow element work never causes unbounded
//! queueing because demand is bounded by the per-pull task budget.

mod metrics;
mod sink;
mod stream;

pub use metrics::{StreamMetrics, StreamMetricsSnapshot};
pub use stream::{ElementStream, StreamOptions};
