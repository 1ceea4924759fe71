//! Prometheus metrics for swing-store export and restore operations.
//!
//! All metrics follow the naming convention: `swingset_<subject>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry,
    TextEncoder,
};

use crate::TelemetryError;

/// Outcome label values.
pub mod outcome {
    /// The operation completed without error.
    pub const SUCCESS: &str = "success";
    /// The operation failed.
    pub const FAILURE: &str = "failure";
}

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Exports handed to a background worker
    pub static ref EXPORTS_INITIATED: Counter = Counter::new(
        "swingset_exports_initiated_total",
        "Total number of swing-store exports initiated"
    ).expect("metric creation failed");

    /// Finished exports by outcome
    pub static ref EXPORTS_COMPLETED: CounterVec = CounterVec::new(
        Opts::new("swingset_exports_completed_total", "Swing-store exports by outcome"),
        &["outcome"]
    ).expect("metric creation failed");

    /// Exports released with a discard request because nobody retrieved them
    pub static ref EXPORTS_DISCARDED: Counter = Counter::new(
        "swingset_exports_discarded_total",
        "Total number of initiated swing-store exports discarded without retrieval"
    ).expect("metric creation failed");

    /// Restores by outcome
    pub static ref RESTORES: CounterVec = CounterVec::new(
        Opts::new("swingset_restores_total", "Swing-store restores by outcome"),
        &["outcome"]
    ).expect("metric creation failed");

    /// Wall time of an export, from initiation to done
    pub static ref EXPORT_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "swingset_export_duration_seconds",
            "Time from export initiation until the export operation is done"
        ).buckets(exponential_buckets(0.01, 2.0, 16).expect("valid buckets"))
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(EXPORTS_INITIATED.clone()),
        Box::new(EXPORTS_COMPLETED.clone()),
        Box::new(EXPORTS_DISCARDED.clone()),
        Box::new(RESTORES.clone()),
        Box::new(EXPORT_DURATION.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Record the outcome of a finished operation on a labelled counter.
pub fn record_outcome<E>(counter: &CounterVec, result: &Result<(), E>) {
    let label = if result.is_ok() {
        outcome::SUCCESS
    } else {
        outcome::FAILURE
    };
    counter.with_label_values(&[label]).inc();
}
