//! Metrics collection and exposition.
//!
//! # Metrics
//! - `scrape_pipeline_runs_total` (counter): pipeline runs by outcome
//! - `scrape_pipeline_duration_seconds` (histogram): run latency
//! - `scrape_route_dispatch_total` (counter): routed URLs by matched/unmatched
//! - `scrape_browser_launches_total` (counter): browser launches by result

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record the end of a pipeline run.
pub fn record_pipeline_run(outcome: &'static str, started: Instant) {
    counter!("scrape_pipeline_runs_total", "outcome" => outcome).increment(1);
    histogram!("scrape_pipeline_duration_seconds").record(started.elapsed().as_secs_f64());
}

/// Record one routed URL.
pub fn record_route(matched: bool) {
    let matched = if matched { "true" } else { "false" };
    counter!("scrape_route_dispatch_total", "matched" => matched).increment(1);
}

/// Record a browser process launch attempt.
pub fn record_browser_launch(success: bool) {
    let result = if success { "ok" } else { "error" };
    counter!("scrape_browser_launches_total", "result" => result).increment(1);
}
