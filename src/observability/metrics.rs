//! Metrics collection and exposition.
//!
//! # Metrics
//! - `referral_sync_rpc_calls_total` (counter): chain calls by operation, outcome
//! - `referral_sync_provider_failovers_total` (counter): connection re-selections
//! - `referral_sync_active_provider` (gauge): ordinal of the live endpoint
//! - `referral_sync_rate_limited_total` (counter): delayed admissions by scope
//! - `referral_sync_cache_events_total` (counter): hit/miss/set/delete/evict/expire
//! - `referral_sync_cache_entries` (gauge)
//! - `referral_sync_sync_cursor` (gauge): last fully processed block
//! - `referral_sync_events_applied_total` (counter): by event kind
//! - `referral_sync_sync_cycles_total` (counter): by outcome
//! - `referral_sync_actions_total` (counter): orchestrator outcomes by action
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter, so unit
//! tests can exercise instrumented code freely.

use std::net::SocketAddr;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_rpc_call(operation: &'static str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!("referral_sync_rpc_calls_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
}

pub fn record_provider_failover(endpoint: &str) {
    counter!("referral_sync_provider_failovers_total", "endpoint" => endpoint.to_string())
        .increment(1);
}

pub fn record_active_provider(ordinal: usize) {
    gauge!("referral_sync_active_provider").set(ordinal as f64);
}

pub fn record_rate_limited(scope: &str) {
    counter!("referral_sync_rate_limited_total", "scope" => scope.to_string()).increment(1);
}

pub fn record_cache_event(event: &'static str) {
    counter!("referral_sync_cache_events_total", "event" => event).increment(1);
}

pub fn record_cache_size(size: usize) {
    gauge!("referral_sync_cache_entries").set(size as f64);
}

pub fn record_sync_cursor(block: u64) {
    gauge!("referral_sync_sync_cursor").set(block as f64);
}

pub fn record_event_applied(kind: &'static str) {
    counter!("referral_sync_events_applied_total", "kind" => kind).increment(1);
}

pub fn record_sync_cycle(outcome: &'static str) {
    counter!("referral_sync_sync_cycles_total", "outcome" => outcome).increment(1);
}

pub fn record_action(action: &'static str, outcome: &'static str) {
    counter!("referral_sync_actions_total", "action" => action, "outcome" => outcome).increment(1);
}
