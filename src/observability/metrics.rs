//! Metrics collection and exposition.
//!
//! # Metrics
//! - `qr_admissions_total` (counter): admission attempts by result
//! - `qr_active_sessions` (gauge): sessions holding an admission slot
//! - `qr_rate_limited_total` (counter): requests answered RATE_LIMIT_EXCEEDED
//! - `qr_transfers_total` (counter): payload transfers by outcome
//! - `qr_transfer_bytes_total` (counter): bytes staged
//! - `qr_decodes_total` (counter): decoder calls by outcome
//! - `qr_decode_duration_seconds` (histogram): decoder latency
//! - `qr_session_ends_total` (counter): closed sessions by reason
//! - `qr_registry_size` (gauge): identities tracked by the rate limiter
//!
//! Every function is a no-op until a recorder is installed.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_admission(admitted: bool) {
    let result = if admitted { "admitted" } else { "busy" };
    counter!("qr_admissions_total", "result" => result).increment(1);
}

pub fn set_active_sessions(count: usize) {
    gauge!("qr_active_sessions").set(count as f64);
}

pub fn record_rate_limited() {
    counter!("qr_rate_limited_total").increment(1);
}

pub fn record_transfer(outcome: &'static str, bytes: u64) {
    counter!("qr_transfers_total", "outcome" => outcome).increment(1);
    counter!("qr_transfer_bytes_total").increment(bytes);
}

pub fn record_decode(outcome: &'static str, elapsed: Duration) {
    counter!("qr_decodes_total", "outcome" => outcome).increment(1);
    histogram!("qr_decode_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_session_end(reason: &'static str) {
    counter!("qr_session_ends_total", "reason" => reason).increment(1);
}

pub fn set_registry_size(size: usize) {
    gauge!("qr_registry_size").set(size as f64);
}
