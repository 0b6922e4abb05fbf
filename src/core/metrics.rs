// src/core/metrics.rs

//! Defines and registers Prometheus metrics for the reconfiguration core.
//!
//! Uses `lazy_static` to ensure metrics are registered only once globally
//! for the application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Gauge, GaugeVec, Histogram, TextEncoder, register_counter_vec, register_gauge,
    register_gauge_vec, register_histogram,
};

lazy_static! {
    /// Reconfiguration records currently in each `RecordState` (§4.1),
    /// labeled by state.
    pub static ref RECORDS_BY_STATE: GaugeVec = register_gauge_vec!(
        "gns_records_by_state",
        "Number of reconfiguration records currently in each state.",
        &["state"]
    )
    .unwrap();

    /// Epoch instances currently in each `EpochStatus` (§3), AR-side,
    /// labeled by status.
    pub static ref EPOCH_INSTANCES_BY_STATUS: GaugeVec = register_gauge_vec!(
        "gns_epoch_instances_by_status",
        "Number of locally hosted epoch instances in each status.",
        &["status"]
    )
    .unwrap();

    /// Retransmitting protocol tasks currently live in the scheduler (§4.3).
    pub static ref PROTOCOL_TASKS_IN_FLIGHT: Gauge = register_gauge!(
        "gns_protocol_tasks_in_flight",
        "Number of retransmitting protocol tasks currently scheduled."
    )
    .unwrap();

    /// Pending peer-to-peer state transfer fetches (§4.2).
    pub static ref PENDING_FETCH_TASKS: Gauge = register_gauge!(
        "gns_pending_fetch_tasks",
        "Number of in-flight final-state fetch tasks."
    )
    .unwrap();

    /// Completed reconfiguration transitions, labeled by the step of
    /// §4.1 that completed.
    pub static ref TRANSITIONS_TOTAL: CounterVec = register_counter_vec!(
        "gns_transitions_total",
        "Total number of completed reconfiguration-record transitions, labeled by step.",
        &["step"]
    )
    .unwrap();

    /// Latency from beginning a transition (e.g. `ClientChangeReplicas`)
    /// to the record returning to READY.
    pub static ref TRANSITION_LATENCY_SECONDS: Histogram = register_histogram!(
        "gns_transition_latency_seconds",
        "Latency of a full reconfiguration transition in seconds."
    )
    .unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
