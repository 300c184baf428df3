//! Metrics instrumentation for traefik-dns.
//!
//! All metrics are prefixed with `traefik_dns.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record an IN/A query handled by the responder.
pub fn record_query(server: &str, result: QueryResult, duration: std::time::Duration) {
    let result_str = match result {
        QueryResult::Hit => "hit",
        QueryResult::Delegated => "delegated",
        QueryResult::NxDomain => "nxdomain",
    };

    counter!("traefik_dns.query.count", "server" => server.to_string(), "result" => result_str)
        .increment(1);
    histogram!("traefik_dns.query.duration.seconds", "server" => server.to_string())
        .record(duration.as_secs_f64());
}

/// Query result type for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryResult {
    /// Answered from the mapping store.
    Hit,
    /// Passed to the downstream handler.
    Delegated,
    /// Negative answer.
    NxDomain,
}

/// Record a query passed through untouched because of its class or type.
pub fn record_ignored_query(record_type: &str) {
    counter!("traefik_dns.query.ignored.count", "type" => record_type.to_string()).increment(1);
}

/// Record the outcome of a reconciliation pass.
pub fn record_reconcile(outcome: ReconcileOutcome, added: usize, removed: usize) {
    let outcome_str = match outcome {
        ReconcileOutcome::Success => "success",
        ReconcileOutcome::FetchError => "fetch_error",
    };

    counter!("traefik_dns.reconcile.count", "outcome" => outcome_str).increment(1);
    counter!("traefik_dns.reconcile.added").increment(added as u64);
    counter!("traefik_dns.reconcile.removed").increment(removed as u64);
}

/// Reconciliation pass outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Router list fetched and applied.
    Success,
    /// Router list could not be fetched; store left unchanged.
    FetchError,
}

/// Record store gauges (call periodically or on change).
pub fn record_state(mappings: usize, ready: bool, generation: u64) {
    gauge!("traefik_dns.state.mappings.count").set(mappings as f64);
    gauge!("traefik_dns.state.ready").set(if ready { 1.0 } else { 0.0 });
    gauge!("traefik_dns.state.generation").set(generation as f64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
