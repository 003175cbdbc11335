//! Prometheus metric families for the front filter.

use once_cell::sync::Lazy;
use prometheus::{
    exponential_buckets, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounterVec, IntGauge,
};

/// Concurrently open ext_proc streams.
pub static ACTIVE_SESSIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "gatescan_producer_active_sessions",
        "Open external-processor streams"
    )
    .expect("register active sessions gauge")
});

/// Scan-session dispositions (accepted, cache_hit, bypassed_congestion, …).
pub static SCAN_SESSIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gatescan_producer_scan_sessions_total",
        "Scan sessions by disposition",
        &["result"]
    )
    .expect("register scan sessions counter")
});

/// Finished requests by method and terminal result.
pub static REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gatescan_producer_requests_total",
        "Requests by method and result",
        &["method", "result"]
    )
    .expect("register requests counter")
});

/// Requests whose URI matched a known registry, labelled by category.
pub static NOTABLE_DOMAINS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gatescan_producer_notable_domain_requests_total",
        "Requests classified against the notable-registry map",
        &["category"]
    )
    .expect("register notable domain counter")
});

/// Clean-URL cache traffic.
pub static CACHE_OPS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gatescan_producer_cache_ops_total",
        "Clean-URL cache operations",
        &["operation"]
    )
    .expect("register cache ops counter")
});

/// Body volume per request, labelled by method.
pub static BODY_SIZE_BYTES: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "gatescan_producer_body_size_bytes",
        "Total body bytes observed per request",
        &["method"],
        exponential_buckets(1024.0, 4.0, 12).expect("buckets")
    )
    .expect("register body size histogram")
});

/// Wall-clock duration of a processing stream.
pub static REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "gatescan_producer_request_duration_seconds",
        "Processing stream duration",
        &["method"],
        exponential_buckets(0.01, 2.0, 14).expect("buckets")
    )
    .expect("register request duration histogram")
});
