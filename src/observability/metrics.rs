//! Metrics collection and exposition.
//!
//! # Metrics
//! - `render_proxy_requests_total` (counter): requests by route, class, status
//! - `render_proxy_request_duration_seconds` (histogram): latency by route, class
//! - `render_proxy_session_launches_total` (counter): engine launches by result
//! - `render_proxy_open_pages` (gauge): pages currently leased
//! - `render_proxy_navigation_attempts_total` (counter): fallback steps by strategy, result
//! - `render_proxy_stub_responses_total` (counter): substituted payloads by reason
//! - `render_proxy_blocked_requests_total` (counter): page requests aborted by the denylist
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

use crate::fetch::StubReason;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &'static str, class: &str, status: u16, start: Instant) {
    counter!(
        "render_proxy_requests_total",
        "route" => route,
        "class" => class.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        "render_proxy_request_duration_seconds",
        "route" => route,
        "class" => class.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_session_launch(success: bool) {
    let result = if success { "success" } else { "failure" };
    counter!("render_proxy_session_launches_total", "result" => result).increment(1);
}

pub fn record_page_opened() {
    gauge!("render_proxy_open_pages").increment(1.0);
}

pub fn record_page_closed() {
    gauge!("render_proxy_open_pages").decrement(1.0);
}

pub fn record_navigation_attempt(strategy: &'static str, result: &'static str) {
    counter!(
        "render_proxy_navigation_attempts_total",
        "strategy" => strategy,
        "result" => result
    )
    .increment(1);
}

pub fn record_stub(reason: StubReason) {
    counter!("render_proxy_stub_responses_total", "reason" => reason.as_str()).increment(1);
}

pub fn record_blocked_request() {
    counter!("render_proxy_blocked_requests_total").increment(1);
}
