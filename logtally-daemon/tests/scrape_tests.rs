//! End-to-end scrape tests against the Prometheus HTTP listener.
//!
//! The recorder is process-global and the listener lives on the test's
//! runtime, so every scrape assertion runs inside one test function.

#![cfg(unix)]

use std::time::Duration;

use logtally_core::config::LogtallyConfig;
use logtally_daemon::orchestrator::Orchestrator;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

const PORT: u16 = 19181;

async fn scrape(path: &str) -> std::io::Result<(u16, String)> {
    let mut stream = TcpStream::connect(("127.0.0.1", PORT)).await?;
    let request = format!("GET {path} HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    let response = String::from_utf8_lossy(&raw).into_owned();

    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_owned())
        .unwrap_or_default();
    Ok((status, body))
}

/// Lines of the exposition that belong to one metric family.
fn family(body: &str, name: &str) -> Vec<String> {
    body.lines()
        .filter(|line| line.starts_with(name))
        .map(str::to_owned)
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scrape_reports_event_counters() {
    let toml_str = format!(
        r#"
[general]
exit_when_idle = false
health_interval_secs = 1

[metrics]
enabled = true
listen_addr = "127.0.0.1"
port = {PORT}
endpoint = "/stats"

[monitor]
stop_timeout_secs = 2

[[events]]
name = "test_event"
description = "Test event"
command = ["echo", "test log with pattern"]
patterns = ["pattern"]

[[events]]
name = "broken_event"
description = "Command that does not exist"
command = ["/nonexistent/logtally-no-such-binary"]
patterns = ["anything"]
"#
    );
    let config = LogtallyConfig::parse(&toml_str).expect("config should parse");
    let mut orchestrator = Orchestrator::build_from_config(config).expect("should build");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let daemon = tokio::spawn(async move {
        orchestrator
            .run_until(async {
                let _ = stop_rx.await;
            })
            .await
    });

    // Wait until the finite command's match is visible
    let mut body = String::new();
    for _ in 0..100 {
        if let Ok((200, scraped)) = scrape("/stats").await {
            if scraped.contains("test_event{pattern=\"pattern\"} 1") {
                body = scraped;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(
        body.contains("test_event{pattern=\"pattern\"} 1"),
        "event counter should be exported, got:\n{body}"
    );
    assert!(body.contains("# TYPE test_event counter"));
    assert!(body.contains("# HELP test_event Test event"));

    // The failed monitor is reported but the endpoint stays reachable
    assert!(
        body.contains("logtally_monitor_start_failures_total{event=\"broken_event\"} 1"),
        "start failure should be counted, got:\n{body}"
    );
    assert!(family(&body, "broken_event{").is_empty());
    assert!(body.contains("logtally_daemon_build_info{version="));

    // Two scrapes with no new matches report identical counts
    let (_, first) = scrape("/stats").await.expect("first scrape");
    let (_, second) = scrape("/stats").await.expect("second scrape");
    assert_eq!(family(&first, "test_event"), family(&second, "test_event"));

    let _ = stop_tx.send(());
    let reports = tokio::time::timeout(Duration::from_secs(10), daemon)
        .await
        .expect("daemon should stop")
        .expect("daemon task should not panic")
        .expect("run should succeed");
    assert_eq!(reports.len(), 2);
}
