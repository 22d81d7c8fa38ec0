//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_grants_total` (counter): grant outcomes (granted, duplicate, unknown_plan, store_error)
//! - `gate_webhooks_total` (counter): payment webhook outcomes
//! - `gate_signature_rejections_total` (counter): notifications failing verification
//! - `gate_gateway_calls_total` (counter): processor calls by operation and outcome
//! - `gate_revocations_total` (counter): revocation callbacks by result
//! - `gate_restore_failures_total` (counter): restorations that exhausted their retries
//! - `gate_sweep_duration_seconds` (histogram): tick latency
//! - `gate_sweep_deferred_users` (gauge): users left for the next tick
//! - `gate_active_users` (gauge): users with an unexpired row at the last tick
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, which keeps tests exporter-free
//! - Prometheus exporter is optional and bound to its own address

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_grant(outcome: &'static str) {
    metrics::counter!("gate_grants_total", "outcome" => outcome).increment(1);
}

pub fn record_webhook(outcome: &'static str) {
    metrics::counter!("gate_webhooks_total", "outcome" => outcome).increment(1);
}

pub fn record_signature_rejected() {
    metrics::counter!("gate_signature_rejections_total").increment(1);
}

pub fn record_gateway_call(operation: &'static str, outcome: &'static str) {
    metrics::counter!("gate_gateway_calls_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
}

pub fn record_revocation(success: bool) {
    let result = if success { "ok" } else { "failed" };
    metrics::counter!("gate_revocations_total", "result" => result).increment(1);
}

pub fn record_restore_failure() {
    metrics::counter!("gate_restore_failures_total").increment(1);
}

pub fn record_sweep(duration: Duration, active_users: usize, deferred_users: usize) {
    metrics::histogram!("gate_sweep_duration_seconds").record(duration.as_secs_f64());
    metrics::gauge!("gate_active_users").set(active_users as f64);
    metrics::gauge!("gate_sweep_deferred_users").set(deferred_users as f64);
}
