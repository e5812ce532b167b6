//! Pipeline metrics recording
//!
//! Global counters and histograms for the stream engine, the rule engine
//! and the unit router. All helpers are no-ops until a metrics recorder is
//! installed (see `init`).

use metrics::{counter, gauge, histogram};

/// Record one completed element reaching its sink
pub fn record_element_done() {
    counter!("pipeline_elements_done_total").increment(1);
}

/// Record an element task that aborted before completing
pub fn record_element_aborted() {
    counter!("pipeline_elements_aborted_total").increment(1);
}

/// Record a chunk handed to the consumer
pub fn record_chunk_delivered(len: usize) {
    counter!("pipeline_chunks_total").increment(1);
    histogram!("pipeline_chunk_len").record(len as f64);
}

/// Record a rule firing
pub fn record_rule_fired(rule: &str) {
    counter!(
        "pipeline_rules_fired_total",
        "rule" => rule.to_string()
    )
    .increment(1);
}

/// Record a rule traversal hopping to another node
pub fn record_hop(node: &str) {
    counter!(
        "pipeline_hops_total",
        "node" => node.to_string()
    )
    .increment(1);
}

/// Record a worker start (first start and restarts alike)
pub fn record_worker_started(kind: &str) {
    counter!(
        "pipeline_workers_started_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record an observed worker exit (TTL expiry and crash alike; the exit
/// signal does not distinguish them)
pub fn record_worker_exited(kind: &str) {
    counter!(
        "pipeline_workers_exited_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record the number of emitters a sink currently multiplexes
pub fn record_active_emitters(count: usize) {
    gauge!("pipeline_active_emitters").set(count as f64);
}
