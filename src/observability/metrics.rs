//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `mimir_controller_reconciliations_total` - Reconciliations per controller
//! - `mimir_controller_reconciliation_errors_total` - Failed reconciliations per controller
//! - `mimir_controller_reconciliation_duration_seconds` - Duration of reconciliations
//! - `mimir_controller_backend_operations_total` - Backend calls by operation and outcome
//! - `mimir_controller_backend_operation_duration_seconds` - Duration of backend calls
//! - `mimir_controller_cached_clients` - Number of clients held per cache
//! - `mimir_controller_requeues_total` - Requeues by controller and reason

use anyhow::Result;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mimir_controller_reconciliations_total",
            "Total number of reconciliations",
        ),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mimir_controller_reconciliation_errors_total",
            "Total number of reconciliation errors",
        ),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mimir_controller_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static BACKEND_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mimir_controller_backend_operations_total",
            "Total number of ruler and alertmanager API calls",
        ),
        &["operation", "outcome"],
    )
    .expect("Failed to create BACKEND_OPERATIONS_TOTAL metric - this should never happen")
});

static BACKEND_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mimir_controller_backend_operation_duration_seconds",
            "Duration of ruler and alertmanager API calls in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 30.0]),
        &["operation"],
    )
    .expect("Failed to create BACKEND_OPERATION_DURATION metric - this should never happen")
});

static CACHED_CLIENTS: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "mimir_controller_cached_clients",
            "Current number of backend clients held in a cache",
        ),
        &["cache"],
    )
    .expect("Failed to create CACHED_CLIENTS metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mimir_controller_requeues_total",
            "Total number of requeues scheduled by reconcilers",
        ),
        &["controller", "reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

/// Register all metrics with the process registry.
///
/// # Errors
/// Fails if a metric was already registered.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(BACKEND_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BACKEND_OPERATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(CACHED_CLIENTS.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations(controller: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[controller]).inc();
}

pub fn increment_reconciliation_errors(controller: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[controller])
        .inc();
}

pub fn observe_reconciliation_duration(controller: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[controller])
        .observe(duration);
}

/// Record one backend call; `outcome` is `success` or an error kind label
pub fn record_backend_operation(operation: &str, outcome: &str, duration: f64) {
    BACKEND_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
    BACKEND_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration);
}

pub fn set_cached_clients(cache: &str, count: usize) {
    CACHED_CLIENTS
        .with_label_values(&[cache])
        .set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn increment_requeues(controller: &str, reason: &str) {
    REQUEUES_TOTAL
        .with_label_values(&[controller, reason])
        .inc();
}

/// Text exposition of the registry for the `/metrics` endpoint
pub fn gather_text() -> Result<String> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_operation_counter_increments() {
        let before = BACKEND_OPERATIONS_TOTAL
            .with_label_values(&["unit_test_op", "success"])
            .get();
        record_backend_operation("unit_test_op", "success", 0.01);
        let after = BACKEND_OPERATIONS_TOTAL
            .with_label_values(&["unit_test_op", "success"])
            .get();
        assert_eq!(after, before + 1);
    }

    #[test]
    fn test_cached_clients_gauge() {
        set_cached_clients("unit_test_cache", 3);
        assert_eq!(
            CACHED_CLIENTS.with_label_values(&["unit_test_cache"]).get(),
            3
        );
    }
}
