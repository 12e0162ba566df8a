/// Metrics and telemetry for the EMD signer
///
/// Prometheus-compatible counters for:
/// - Signed and failed documents
/// - Polling cycles by outcome
/// - Failure cache size
/// - Signing batch duration
///
/// Metrics live in the process registry only; there is no scrape endpoint.
/// `render_metrics` gives the text exposition for inspection and `summary`
/// a one-line digest for the log.
use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ========== Document Metrics ==========

    /// Documents whose signature was stored on the portal
    pub static ref DOCUMENTS_SIGNED_TOTAL: IntCounter = register_int_counter!(
        "emd_documents_signed_total",
        "Total number of documents signed"
    )
    .unwrap();

    /// Documents that failed with a recoverable error
    pub static ref DOCUMENTS_FAILED_TOTAL: IntCounter = register_int_counter!(
        "emd_documents_failed_total",
        "Total number of documents that failed to sign"
    )
    .unwrap();

    /// Documents waiting for manual signing
    pub static ref DOCUMENTS_MANUAL: IntGauge = register_int_gauge!(
        "emd_documents_manual",
        "Number of documents that must be signed manually"
    )
    .unwrap();

    // ========== Cycle Metrics ==========

    /// Polling cycles by outcome
    pub static ref CYCLES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "emd_cycles_total",
        "Total number of polling cycles",
        &["outcome"]
    )
    .unwrap();

    /// Signing batch duration in seconds
    pub static ref BATCH_DURATION_SECONDS: Histogram = register_histogram!(
        "emd_batch_duration_seconds",
        "Signing batch duration in seconds",
        vec![0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 900.0]
    )
    .unwrap();

    // ========== Cache Metrics ==========

    /// Failure cache size (number of entries)
    pub static ref CACHE_SIZE: IntGauge = register_int_gauge!(
        "emd_failure_cache_size",
        "Number of entries in the failure cache"
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// One-line digest of the running totals
pub fn summary() -> String {
    format!(
        "signed={} failed={} manual={} cache={} batches={}",
        DOCUMENTS_SIGNED_TOTAL.get(),
        DOCUMENTS_FAILED_TOTAL.get(),
        DOCUMENTS_MANUAL.get(),
        CACHE_SIZE.get(),
        BATCH_DURATION_SECONDS.get_sample_count()
    )
}

/// Record the outcome of a signing batch
pub fn record_batch(signed: usize, failed: usize, duration: f64) {
    DOCUMENTS_SIGNED_TOTAL.inc_by(signed as u64);
    DOCUMENTS_FAILED_TOTAL.inc_by(failed as u64);
    BATCH_DURATION_SECONDS.observe(duration);
}

/// Record a finished polling cycle
pub fn record_cycle(outcome: &str) {
    CYCLES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Update the failure cache gauge
pub fn set_cache_size(size: usize) {
    CACHE_SIZE.set(size as i64);
}

/// Update the manual-signing gauge
pub fn set_manual_documents(count: usize) {
    DOCUMENTS_MANUAL.set(count as i64);
}
