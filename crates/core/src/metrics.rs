//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Reconciliation (dispatches, resends, requeues, dropped submissions)
//! - Event loop (handled messages by topic and outcome)
//! - Backlog depth
//! - Worker runtime (solves by model and outcome)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Orchestrator - Reconciliation Metrics
// =============================================================================

/// Problems sent to a worker's request topic.
pub static DISPATCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("solvd_dispatches_total", "Problems dispatched to workers"),
        &["source"], // "inbound", "backlog"
    )
    .unwrap()
});

/// Resend advisories published.
pub static RESEND_ADVISORIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "solvd_resend_advisories_total",
        "Resend advisories published for problems dropped by a worker",
    )
    .unwrap()
});

/// Submissions put back at the head of the backlog.
pub static REQUEUES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "solvd_requeues_total",
        "Pending requests returned to the head of the backlog",
    )
    .unwrap()
});

/// Inbound submissions dropped as duplicates or deleted.
pub static DROPPED_SUBMISSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "solvd_dropped_submissions_total",
            "Inbound submissions dropped without dispatch",
        ),
        &["reason"], // "deleted", "queued", "requested", "running"
    )
    .unwrap()
});

/// Current backlog length, sampled after every handled event.
pub static BACKLOG_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("solvd_backlog_depth", "Problems waiting in the backlog").unwrap()
});

// =============================================================================
// Orchestrator - Event Loop Metrics
// =============================================================================

/// Bus messages processed by topic and outcome.
pub static EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("solvd_events_total", "Bus messages processed"),
        &["topic", "outcome"], // "handled", "skipped", "failed"
    )
    .unwrap()
});

// =============================================================================
// Worker Metrics
// =============================================================================

/// Solves by model and outcome.
pub static SOLVES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("solvd_solves_total", "Solve attempts on this worker"),
        &["model", "outcome"], // "success", "rejected", "failed"
    )
    .unwrap()
});

/// Solver wall time in seconds.
pub static SOLVE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("solvd_solve_duration_seconds", "Solver execution time")
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]),
        &["model"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Reconciliation
        Box::new(DISPATCHES_TOTAL.clone()),
        Box::new(RESEND_ADVISORIES_TOTAL.clone()),
        Box::new(REQUEUES_TOTAL.clone()),
        Box::new(DROPPED_SUBMISSIONS_TOTAL.clone()),
        Box::new(BACKLOG_DEPTH.clone()),
        // Event loop
        Box::new(EVENTS_TOTAL.clone()),
        // Worker
        Box::new(SOLVES_TOTAL.clone()),
        Box::new(SOLVE_DURATION.clone()),
    ]
}
