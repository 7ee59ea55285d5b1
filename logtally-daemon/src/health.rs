//! Aggregated health reporting.
//!
//! Reads every monitor's published state from the supervisor's status board
//! and produces a unified [`DaemonHealth`] report. The overall daemon status
//! is the worst status among all monitors.
//!
//! # Aggregation Rule
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)

use std::time::Instant;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use logtally_core::health::HealthStatus;
use logtally_monitor::StatusBoard;

/// Aggregated health report for the entire daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Overall daemon health status (worst of all monitors).
    pub status: HealthStatus,
    /// Daemon uptime in seconds since start.
    pub uptime_secs: u64,
    /// Per-monitor health reports.
    pub monitors: Vec<MonitorHealth>,
}

/// Health of a single event monitor.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorHealth {
    /// Event name.
    pub name: String,
    /// Current loop state, e.g. `streaming`.
    pub state: String,
    /// Health derived from the state.
    pub status: HealthStatus,
}

/// Read the current state of every monitor on the board.
///
/// A monitor whose task ended without publishing `Stopped` (it panicked)
/// is reported as unhealthy.
pub fn collect_health(board: &StatusBoard) -> Vec<MonitorHealth> {
    board
        .iter()
        .map(|(name, state)| {
            let current = state.borrow().clone();
            let orphaned = state.has_changed().is_err() && !current.is_stopped();
            let status = if orphaned {
                HealthStatus::Unhealthy("monitor task exited unexpectedly".to_owned())
            } else {
                current.health()
            };
            MonitorHealth {
                name: name.clone(),
                state: current.to_string(),
                status,
            }
        })
        .collect()
}

/// Aggregate monitor health statuses into a single status.
///
/// Returns the worst status found: Unhealthy > Degraded > Healthy.
pub fn aggregate_status(monitors: &[MonitorHealth]) -> HealthStatus {
    let mut worst = HealthStatus::Healthy;
    let mut reasons = Vec::new();

    for monitor in monitors {
        match &monitor.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                if !worst.is_unhealthy() {
                    reasons.push(format!("{}: {}", monitor.name, reason));
                    worst = HealthStatus::Degraded(String::new());
                }
            }
            HealthStatus::Unhealthy(reason) => {
                if !worst.is_unhealthy() {
                    // Unhealthy reasons replace degraded ones
                    reasons.clear();
                }
                reasons.push(format!("{}: {}", monitor.name, reason));
                worst = HealthStatus::Unhealthy(String::new());
            }
        }
    }

    match worst {
        HealthStatus::Healthy => HealthStatus::Healthy,
        HealthStatus::Degraded(_) => HealthStatus::Degraded(reasons.join("; ")),
        HealthStatus::Unhealthy(_) => HealthStatus::Unhealthy(reasons.join("; ")),
    }
}

/// Build a full health report from the status board.
pub fn daemon_health(board: &StatusBoard, start_time: Instant) -> DaemonHealth {
    let monitors = collect_health(board);
    DaemonHealth {
        status: aggregate_status(&monitors),
        uptime_secs: start_time.elapsed().as_secs(),
        monitors,
    }
}

/// Spawn a background task that periodically logs the aggregated health.
///
/// Healthy reports are logged at debug, degraded ones at info and
/// unhealthy ones at warn.
pub fn spawn_health_check_task(
    board: StatusBoard,
    interval_secs: u64,
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so startup is not reported as a check
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let health = daemon_health(&board, start_time);
                    let running = health
                        .monitors
                        .iter()
                        .filter(|m| m.status.is_healthy())
                        .count();
                    match &health.status {
                        HealthStatus::Healthy => tracing::debug!(
                            monitors = health.monitors.len(),
                            uptime_secs = health.uptime_secs,
                            "health check: healthy"
                        ),
                        HealthStatus::Degraded(reason) => tracing::info!(
                            running,
                            monitors = health.monitors.len(),
                            reason = %reason,
                            "health check: degraded"
                        ),
                        HealthStatus::Unhealthy(reason) => tracing::warn!(
                            running,
                            monitors = health.monitors.len(),
                            reason = %reason,
                            "health check: unhealthy"
                        ),
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("health check task shutting down");
                    break;
                }
            }
        }
    })
}
