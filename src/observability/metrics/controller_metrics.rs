//! # Controller Metrics
//!
//! Metrics for reconciliation: pipeline runs, step outcomes, requeues,
//! convergence writes, install-plan approvals and gated watches.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramVec, IntCounter, IntCounterVec};
use std::sync::LazyLock;

// Reconciliation metrics
static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "monitoring_stack_operator_reconciliations_total",
            "Total number of pipeline reconciliations",
        ),
        &["pipeline"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "monitoring_stack_operator_reconciliation_errors_total",
            "Total number of reconciliations that stopped with an error",
        ),
        &["pipeline"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "monitoring_stack_operator_reconciliation_duration_seconds",
            "Duration of a pipeline reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["pipeline"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

// Step metrics
static STEP_RESULTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "monitoring_stack_operator_step_results_total",
            "Pipeline step results by step and outcome",
        ),
        &["step", "outcome"],
    )
    .expect("Failed to create STEP_RESULTS_TOTAL metric - this should never happen")
});

// Requeue metrics
static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "monitoring_stack_operator_requeues_total",
            "Total number of reconciliation requeues",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

// Convergence metrics
static WRITES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "monitoring_stack_operator_writes_total",
            "Store writes performed while converging managed resources",
        ),
        &["kind", "verb"],
    )
    .expect("Failed to create WRITES_TOTAL metric - this should never happen")
});

static INSTALL_PLANS_APPROVED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "monitoring_stack_operator_install_plans_approved_total",
        "Total number of install plans approved",
    )
    .expect("Failed to create INSTALL_PLANS_APPROVED_TOTAL metric - this should never happen")
});

static WATCHES_ESTABLISHED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "monitoring_stack_operator_watches_established_total",
            "Gated watches established after a successful capability probe",
        ),
        &["kind"],
    )
    .expect("Failed to create WATCHES_ESTABLISHED_TOTAL metric - this should never happen")
});

/// Register controller metrics with the registry
pub(crate) fn register_controller_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(STEP_RESULTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WRITES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INSTALL_PLANS_APPROVED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WATCHES_ESTABLISHED_TOTAL.clone()))?;
    Ok(())
}

// Public functions for controller metrics

pub fn increment_reconciliations(pipeline: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[pipeline]).inc();
}

pub fn increment_reconciliation_errors(pipeline: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[pipeline])
        .inc();
}

pub fn observe_reconciliation_duration(pipeline: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[pipeline])
        .observe(duration);
}

pub fn increment_step_results(step: &str, outcome: &str) {
    STEP_RESULTS_TOTAL.with_label_values(&[step, outcome]).inc();
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_writes(kind: &str, verb: &str) {
    WRITES_TOTAL.with_label_values(&[kind, verb]).inc();
}

pub fn increment_install_plans_approved() {
    INSTALL_PLANS_APPROVED_TOTAL.inc();
}

pub fn increment_watches_established(kind: &str) {
    WATCHES_ESTABLISHED_TOTAL.with_label_values(&[kind]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.with_label_values(&["test"]).get();
        increment_reconciliations("test");
        let after = RECONCILIATIONS_TOTAL.with_label_values(&["test"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_reconciliation_errors() {
        let before = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["test"])
            .get();
        increment_reconciliation_errors("test");
        let after = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["test"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_observe_reconciliation_duration() {
        observe_reconciliation_duration("test", 1.5);
        let count = RECONCILIATION_DURATION
            .with_label_values(&["test"])
            .get_sample_count();
        assert!(count >= 1);
    }

    #[test]
    fn test_increment_requeues_by_reason() {
        let before = REQUEUES_TOTAL.with_label_values(&["conflict"]).get();
        increment_requeues_total("conflict");
        let after = REQUEUES_TOTAL.with_label_values(&["conflict"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_writes_by_kind_and_verb() {
        let before = WRITES_TOTAL.with_label_values(&["ConfigMap", "update"]).get();
        increment_writes("ConfigMap", "update");
        let after = WRITES_TOTAL.with_label_values(&["ConfigMap", "update"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_install_plans_approved() {
        let before = INSTALL_PLANS_APPROVED_TOTAL.get();
        increment_install_plans_approved();
        assert_eq!(INSTALL_PLANS_APPROVED_TOTAL.get(), before + 1u64);
    }
}
