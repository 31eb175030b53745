/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/metrics.rs
*
* This module defines and registers the custom Prometheus metrics that the
* canary operator exposes. These metrics provide insights into the behavior
* of the reconciliation loop and the lifecycle of the rollouts it manages.
*
* Using `lazy_static`, we ensure that the metrics are created only once and
* are available globally and safely across the reconciliation loop and the
* web server threads.
*
* SPDX-License-Identifier: Apache-2.0
*/

use lazy_static::lazy_static;
use prometheus::{
    opts, register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge, Registry,
};

// --- Metric Definitions ---

lazy_static! {
    /// A counter for finished rollouts, labeled by outcome
    /// ("promoted" or "rolled_back").
    pub static ref PHCANARY_ROLLOUTS_TOTAL: IntCounterVec =
        register_int_counter_vec!(
            "phcanary_rollouts_total",
            "Total number of finished canary rollouts.",
            &["outcome"]
        ).unwrap();

    /// A counter for reconciliation steps that ended in an error. One
    /// resource failing its step increments this once; the tick carries on.
    pub static ref PHCANARY_RECONCILE_ERRORS_TOTAL: IntCounter =
        register_int_counter!(opts!(
            "phcanary_reconcile_errors_total",
            "Total number of per-resource reconciliation errors."
        )).unwrap();

    /// A gauge that shows the number of canaries in a non-terminal phase as
    /// of the last completed tick.
    pub static ref PHCANARY_ACTIVE: IntGauge =
        register_int_gauge!(opts!(
            "phcanary_active",
            "Current number of canaries still being rolled out."
        )).unwrap();

    /// A histogram that measures the wall-clock duration of one full
    /// reconciliation tick. The buckets are defined in seconds.
    pub static ref PHCANARY_TICK_DURATION_SECONDS: Histogram =
        register_histogram!(
            "phcanary_tick_duration_seconds",
            "Duration of one reconciliation tick over all resources.",
            vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
        ).unwrap();
}

/// Creates a new Prometheus registry and registers all custom metrics.
///
/// This function is intended to be called once at operator startup.
pub fn create_and_register_metrics() -> Result<Registry, prometheus::Error> {
    let r = Registry::new();
    r.register(Box::new(PHCANARY_ROLLOUTS_TOTAL.clone()))?;
    r.register(Box::new(PHCANARY_RECONCILE_ERRORS_TOTAL.clone()))?;
    r.register(Box::new(PHCANARY_ACTIVE.clone()))?;
    r.register(Box::new(PHCANARY_TICK_DURATION_SECONDS.clone()))?;
    Ok(r)
}

// --- Tests ---
