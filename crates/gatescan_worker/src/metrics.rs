//! Prometheus metric families for the worker.
//!
//! Registered against the default registry; exposition is handled by the
//! deployment platform, not this crate.

use once_cell::sync::Lazy;
use prometheus::{
    exponential_buckets, register_histogram, register_histogram_vec, register_int_counter_vec,
    Histogram, HistogramVec, IntCounterVec,
};

/// Terminal scan results by status.
pub static SCAN_RESULTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gatescan_worker_scan_results_total",
        "Scan results published by this worker",
        &["result"]
    )
    .expect("register scan results counter")
});

/// Queue wait: pickup minus enqueue.
pub static WAIT_TAT_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "gatescan_worker_wait_tat_seconds",
        "Time a job waited on the queue before pickup",
        exponential_buckets(0.05, 2.0, 14).expect("buckets")
    )
    .expect("register wait tat histogram")
});

/// Processing: publish minus pickup.
pub static PROCESS_TAT_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "gatescan_worker_process_tat_seconds",
        "Time from job pickup to result publication",
        exponential_buckets(0.05, 2.0, 14).expect("buckets")
    )
    .expect("register process tat histogram")
});

/// End to end: publish minus enqueue.
pub static TOTAL_TAT_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "gatescan_worker_total_tat_seconds",
        "Time from enqueue to result publication",
        exponential_buckets(0.05, 2.0, 14).expect("buckets")
    )
    .expect("register total tat histogram")
});

/// Engine round-trip per scan.
pub static SCAN_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "gatescan_worker_scan_duration_seconds",
        "Engine INSTREAM round-trip time",
        exponential_buckets(0.01, 2.0, 14).expect("buckets")
    )
    .expect("register scan duration histogram")
});

/// Scanned volume, labelled by size class.
pub static BYTES_SCANNED: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "gatescan_worker_bytes_scanned",
        "Bytes streamed through the engine per scan",
        &["size_class"],
        exponential_buckets(1024.0, 4.0, 12).expect("buckets")
    )
    .expect("register bytes histogram")
});
