//! Ambient Prometheus metrics, directly modeled on the teacher's
//! `metrics.rs` (`lazy_static!` + `register_*_vec!` macros). Observability
//! is not a spec'd feature of Currier, so this stays minimal: request
//! counters, capture/fanout counters, and a run-duration histogram.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    pub static ref PROXY_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "currier_proxy_requests_total",
        "Total number of requests handled by the proxy core",
        &["method", "status"]
    )
    .unwrap();

    pub static ref CAPTURES_TOTAL: CounterVec = register_counter_vec!(
        "currier_captures_total",
        "Total number of requests recorded into the capture ring",
        &["host"]
    )
    .unwrap();

    pub static ref FANOUT_DROPPED_TOTAL: CounterVec = register_counter_vec!(
        "currier_fanout_dropped_total",
        "Total number of captures dropped because a listener queue was full",
        &["listener"]
    )
    .unwrap();

    pub static ref RUN_DURATION_MS: HistogramVec = register_histogram_vec!(
        "currier_run_duration_ms",
        "Histogram of collection run durations in milliseconds",
        &["collection"],
        vec![10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0, 30000.0]
    )
    .unwrap();
}

pub fn record_proxy_request(method: &str, status: u16) {
    PROXY_REQUESTS_TOTAL
        .with_label_values(&[method, &status.to_string()])
        .inc();
}

pub fn record_capture(host: &str) {
    CAPTURES_TOTAL.with_label_values(&[host]).inc();
}

pub fn record_fanout_drop(listener: &str) {
    FANOUT_DROPPED_TOTAL.with_label_values(&[listener]).inc();
}

pub fn record_run_duration(collection: &str, duration_ms: f64) {
    RUN_DURATION_MS
        .with_label_values(&[collection])
        .observe(duration_ms);
}

pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
