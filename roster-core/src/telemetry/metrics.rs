//! Prometheus metrics setup and metric definitions

use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle> {
    // Seconds; sub-millisecond buckets for cached/static endpoints
    let buckets = [
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(&buckets)
        .context("Failed to set histogram buckets")?
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

/// Register metric descriptions and emit initial zero values so the
/// exposition includes HELP/TYPE lines from startup.
pub fn describe_metrics() {
    describe_counter!("roster_http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "roster_http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_gauge!(
        "roster_http_requests_in_flight",
        "Number of HTTP requests currently being processed"
    );

    describe_counter!(
        "roster_auth_login_total",
        "Login attempts by flow (token/session) and result"
    );
    describe_counter!(
        "roster_auth_rejected_total",
        "Credentials rejected by the auth stages, by flow"
    );
    describe_counter!(
        "roster_session_refresh_total",
        "Expired session cookies replaced with a fresh token"
    );

    gauge!("roster_http_requests_in_flight").set(0.0);
    counter!("roster_session_refresh_total").absolute(0);
}
