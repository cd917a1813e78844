//! Observability utilities: request counters and latency histograms

use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder};

static REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    prometheus::register_int_counter_vec!("probe_requests_total", "Completion requests issued", &["mode", "outcome"]).unwrap()
});
static LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    prometheus::register_histogram_vec!(
        "probe_request_seconds",
        "Wall time from dispatch to terminal response",
        &["mode"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .unwrap()
});
static INFLIGHT: Lazy<IntGauge> = Lazy::new(|| prometheus::register_int_gauge!("probe_inflight_requests", "Requests awaiting a terminal response").unwrap());
static FRAGMENTS: Lazy<IntCounter> = Lazy::new(|| prometheus::register_int_counter!("probe_stream_fragments_total", "Content fragments received while streaming").unwrap());

pub fn init() {
    let _ = &*REQUESTS;
    let _ = &*LATENCY;
    let _ = &*INFLIGHT;
    let _ = &*FRAGMENTS;
}

/// Raises the in-flight gauge until dropped.
pub struct InflightGuard(());

impl Drop for InflightGuard {
    fn drop(&mut self) { INFLIGHT.dec(); }
}

pub fn track_inflight() -> InflightGuard {
    INFLIGHT.inc();
    InflightGuard(())
}

pub fn inflight() -> i64 { INFLIGHT.get() }

pub fn record_request(mode: &str, outcome: &str, elapsed_seconds: f64) {
    REQUESTS.with_label_values(&[mode, outcome]).inc();
    LATENCY.with_label_values(&[mode]).observe(elapsed_seconds);
}

pub fn requests_total(mode: &str, outcome: &str) -> u64 {
    REQUESTS.with_label_values(&[mode, outcome]).get()
}

pub fn record_fragment() { FRAGMENTS.inc(); }

pub fn stream_fragments() -> u64 { FRAGMENTS.get() }

/// Prometheus text exposition of the default registry.
pub fn render() -> String {
    init();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
