// Metrics and observability module
// This file handles collection of upstream latency, route confirmation time
// and payout outcome counters, exported in Prometheus text format
//
// Numan Thabit 2025 Nov

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

pub static REQ_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "payout_request_latency_seconds",
        "latency for upstream calls",
        &["service", "method"]
    )
    .unwrap()
});

pub static REQ_ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "payout_request_errors_total",
        "errors by upstream",
        &["service", "method"]
    )
    .unwrap()
});

pub static ROUTE_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "payout_route_confirmation_seconds",
        "time from first broadcast to confirmation",
        &["route"],
        vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 900.0]
    )
    .unwrap()
});

pub static PAYOUT_OUTCOMES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "payout_outcomes_total",
        "payout outcomes by status and failure kind",
        &["status", "reason"]
    )
    .unwrap()
});

pub static BATCHES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("payout_batches_total", "batches by final status", &["status"]).unwrap()
});

/// Render the default registry in Prometheus text format.
pub fn render() -> String {
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buf) {
        tracing::warn!(error = %err, "metrics encoding failed");
    }
    String::from_utf8(buf).unwrap_or_default()
}
