//! Telemetry initialization: metrics and structured logging

pub mod metrics;

use crate::config::TelemetryConfig;
use anyhow::Result;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "roster_core=info,tower_http=debug";

/// Initialise logging and, when enabled, the Prometheus recorder.
///
/// Returns `Some(PrometheusHandle)` when metrics are enabled so the HTTP
/// server can expose a `/metrics` endpoint.
pub fn init(config: &TelemetryConfig) -> Result<Option<PrometheusHandle>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());

    let prometheus_handle = if config.metrics_enabled {
        let handle = metrics::install_prometheus_recorder()?;
        metrics::describe_metrics();
        Some(handle)
    } else {
        None
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if config.log_format == "json" {
        // Flatten event fields so `message` is top-level
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true);
        registry.with(fmt_layer).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if let Err(e) = result {
        eprintln!("WARN: tracing subscriber already installed: {}", e);
    }

    Ok(prometheus_handle)
}
