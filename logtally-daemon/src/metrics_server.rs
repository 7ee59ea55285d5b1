//! Prometheus metrics HTTP server.
//!
//! Uses the built-in HTTP listener from `metrics-exporter-prometheus`
//! to expose the event counters and self-metrics.
//!
//! # Usage
//!
//! ```ignore
//! let config = MetricsConfig::default();
//! let addr = install_metrics_recorder(&config)?;
//! // From here on every metrics::counter!() / metrics::gauge!() call is exported
//! ```

use std::net::SocketAddr;

use logtally_core::config::MetricsConfig;
use logtally_core::error::ExporterError;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Resolve the listener address from the `[metrics]` section.
///
/// The built-in listener renders the exposition on every path, so any
/// absolute `endpoint` is served as configured.
///
/// # Errors
///
/// - `endpoint` does not start with `/`
/// - `listen_addr:port` is not a socket address
pub fn listen_address(config: &MetricsConfig) -> Result<SocketAddr, ExporterError> {
    if !config.endpoint.starts_with('/') {
        return Err(ExporterError::InvalidEndpoint(config.endpoint.clone()));
    }

    let raw = format!("{}:{}", config.listen_addr, config.port);
    raw.parse().map_err(|e: std::net::AddrParseError| ExporterError::InvalidAddress {
        addr: raw.clone(),
        reason: e.to_string(),
    })
}

/// Install the global metrics recorder and start the HTTP listener.
///
/// Must run once per process, before any event counter is created, so that
/// every counter handle is bound to the Prometheus recorder.
///
/// # Errors
///
/// - Invalid endpoint or listen address
/// - Socket binding fails
/// - A global recorder is already installed
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<SocketAddr, ExporterError> {
    let addr = listen_address(config)?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
        );
    }

    tracing::info!(listen_addr = %addr, "installing Prometheus metrics recorder");

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| ExporterError::Listen {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;

    logtally_core::metrics::describe_all();

    tracing::info!(
        listen_addr = %addr,
        endpoint = %config.endpoint,
        "Prometheus metrics endpoint active"
    );

    Ok(addr)
}
