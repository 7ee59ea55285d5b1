//! Integration tests for metrics server functionality.
//!
//! The global recorder can be installed once per process, so only one test
//! in this binary installs successfully; the others fail before installing.

use logtally_core::config::MetricsConfig;
use logtally_core::error::ExporterError;
use logtally_daemon::metrics_server;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn test_install_metrics_recorder_succeeds_with_valid_config() {
    // Given: A valid metrics configuration
    let config = MetricsConfig {
        enabled: true,
        listen_addr: "127.0.0.1".to_string(),
        port: 19100, // Use non-standard port to avoid conflicts
        endpoint: "/metrics".to_string(),
    };

    // When: Installing the metrics recorder
    let result = metrics_server::install_metrics_recorder(&config);

    // Then: Should succeed and report the bound address
    let addr = result.expect("install_metrics_recorder should succeed with valid config");
    assert_eq!(addr.port(), 19100);

    // And: A second install in the same process is rejected
    let again = metrics_server::install_metrics_recorder(&MetricsConfig {
        port: 19102,
        ..config
    });
    assert!(matches!(again, Err(ExporterError::Listen { .. })));
}

#[test]
#[serial]
fn test_install_metrics_recorder_fails_with_invalid_address() {
    // Given: An invalid metrics configuration (invalid IP)
    let config = MetricsConfig {
        enabled: true,
        listen_addr: "999.999.999.999".to_string(),
        port: 9100,
        endpoint: "/metrics".to_string(),
    };

    // When: Installing the metrics recorder
    let result = metrics_server::install_metrics_recorder(&config);

    // Then: Should fail before touching the global recorder
    assert!(
        matches!(result, Err(ExporterError::InvalidAddress { .. })),
        "install_metrics_recorder should fail with invalid address: {result:?}"
    );
}

#[test]
#[serial]
fn test_install_metrics_recorder_rejects_relative_endpoint() {
    let config = MetricsConfig {
        enabled: true,
        listen_addr: "127.0.0.1".to_string(),
        port: 19101,
        endpoint: "custom".to_string(),
    };

    let result = metrics_server::install_metrics_recorder(&config);

    assert!(
        matches!(result, Err(ExporterError::InvalidEndpoint(_))),
        "install_metrics_recorder should reject endpoints without a leading '/'"
    );
}
