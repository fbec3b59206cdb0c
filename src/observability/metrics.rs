//! Metrics collection and exposition.
//!
//! # Metrics
//! - `settlement_http_requests_total` (counter): API requests by method, status
//! - `settlement_http_request_duration_seconds` (histogram): API latency
//! - `settlement_rpc_errors_total` (counter): failed RPC calls by chain, method
//! - `settlement_chain_reachable` (gauge): 1=reachable, 0=unreachable
//! - `settlement_tx_submitted_total` (counter): broadcast txs by chain, operation
//! - `settlement_stage_transitions_total` (counter): entries into each stage
//! - `settlement_stage_duration_seconds` (histogram): time spent per stage
//! - `settlement_outcomes_total` (counter): completed/failed by error kind
//! - `settlement_ledger_failures_total` (counter): campaign ledger write failures
//! - `settlement_callbacks_total` (counter): gateway callbacks by status
//!
//! Recording is a no-op until `init_metrics` installs the recorder.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    metrics::counter!(
        "settlement_http_requests_total",
        "method" => method.to_string(),
        "status" => status.clone()
    )
    .increment(1);
    metrics::histogram!(
        "settlement_http_request_duration_seconds",
        "method" => method.to_string(),
        "status" => status
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_rpc_error(chain: &str, method: &str) {
    metrics::counter!(
        "settlement_rpc_errors_total",
        "chain" => chain.to_string(),
        "method" => method.to_string()
    )
    .increment(1);
}

pub fn record_chain_health(chain: &str, reachable: bool) {
    metrics::gauge!("settlement_chain_reachable", "chain" => chain.to_string())
        .set(if reachable { 1.0 } else { 0.0 });
}

pub fn record_tx_submitted(chain: &str, operation: &str) {
    metrics::counter!(
        "settlement_tx_submitted_total",
        "chain" => chain.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

pub fn record_stage_transition(stage: &str) {
    metrics::counter!("settlement_stage_transitions_total", "stage" => stage.to_string()).increment(1);
}

pub fn record_stage_duration(stage: &str, elapsed: Duration) {
    metrics::histogram!("settlement_stage_duration_seconds", "stage" => stage.to_string())
        .record(elapsed.as_secs_f64());
}

/// `kind` is the error kind for failures, `none` for completions.
pub fn record_settlement_outcome(outcome: &str, kind: &str) {
    metrics::counter!(
        "settlement_outcomes_total",
        "outcome" => outcome.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

pub fn record_ledger_failure() {
    metrics::counter!("settlement_ledger_failures_total").increment(1);
}

pub fn record_callback(status: &str) {
    metrics::counter!("settlement_callbacks_total", "status" => status.to_string()).increment(1);
}
