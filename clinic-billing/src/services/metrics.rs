//! Prometheus metrics for clinic-billing.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, HistogramVec,
    IntGauge, TextEncoder,
};

/// Billing actions by action name and outcome (applied, warning, denied, error).
pub static ACTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "clinic_billing_actions_total",
        "Total number of billing actions by outcome",
        &["action", "outcome"]
    )
    .expect("Failed to register actions_total")
});

/// Saved bills by kind and result.
pub static SUBMISSIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "clinic_billing_submissions_total",
        "Total number of bill submissions by kind and result",
        &["kind", "result"]
    )
    .expect("Failed to register submissions_total")
});

/// Backend call duration by operation.
pub static BACKEND_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "clinic_billing_backend_request_duration_seconds",
        "Clinic backend request duration in seconds",
        &["operation"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register backend_request_duration")
});

/// Fetch responses dropped because a newer selection superseded them.
pub static STALE_FETCHES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "clinic_billing_stale_fetches_total",
        "Total number of discarded stale fetch responses",
        &["fetch"] // balance, catalog
    )
    .expect("Failed to register stale_fetches_total")
});

/// Open billing sessions.
pub static OPEN_SESSIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("clinic_billing_open_sessions", "Number of open billing sessions")
        .expect("Failed to register open_sessions")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&ACTIONS_TOTAL);
    Lazy::force(&SUBMISSIONS_TOTAL);
    Lazy::force(&BACKEND_REQUEST_DURATION);
    Lazy::force(&STALE_FETCHES_TOTAL);
    Lazy::force(&OPEN_SESSIONS);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
