//! # Unit Router
//!
//! On-demand, node-aware worker layer. One router actor per node routes
//! "run this with your local state" tasks to the single live worker for a
//! `(kind, arg)` spec, starting workers lazily and restarting them on the
//! next demand after they die.

mod metrics;
mod router;
mod worker;

pub use metrics::{RouterMetrics, RouterMetricsSnapshot};
pub use router::Router;
pub use worker::{spawn_worker, HomeFn, SimpleUnit, UnitInitFn};
