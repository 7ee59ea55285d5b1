//! Daemon orchestration -- assembly and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `logtally-daemon`.
//! It validates configuration, installs the Prometheus recorder, creates the
//! shared counter registry and the monitor supervisor, and runs the main loop.
//!
//! # Startup Order
//!
//! 1. Metrics recorder (so every counter handle binds to it)
//! 2. Counter registration for every event (fatal on duplicates)
//! 3. One monitor task per event
//! 4. Background tasks (health check, uptime updater)
//!
//! # Shutdown
//!
//! On `SIGTERM`/`SIGINT` every monitor is cancelled, each subprocess group is
//! terminated within `monitor.stop_timeout_secs`, and background tasks exit.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::broadcast;

use logtally_core::config::LogtallyConfig;
use logtally_core::metrics::{DAEMON_BUILD_INFO, DAEMON_UPTIME_SECONDS, LABEL_VERSION};
use logtally_monitor::{CounterRegistry, MonitorConfig, MonitorReport, StopReason, Supervisor};

use crate::health::{DaemonHealth, daemon_health, spawn_health_check_task};
use crate::metrics_server;

/// Seconds between uptime gauge refreshes.
const UPTIME_REFRESH_SECS: u64 = 10;

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: LogtallyConfig,
    /// Counters shared by every monitor.
    registry: Arc<CounterRegistry>,
    /// Owns every monitor task.
    supervisor: Supervisor,
    /// Shutdown broadcast sender (signals background tasks).
    shutdown_tx: broadcast::Sender<()>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read, parsed or
    /// validated, or if the metrics recorder cannot be installed.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = LogtallyConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config)
    }

    /// Build from an already-loaded configuration.
    ///
    /// Installs the global metrics recorder when `metrics.enabled` is set,
    /// which can happen only once per process.
    pub fn build_from_config(config: LogtallyConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        // Install metrics recorder before any counter is registered
        if config.metrics.enabled {
            let addr = metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(listen_addr = %addr, "metrics endpoint enabled");
            record_build_info();
        } else {
            tracing::warn!("metrics exporter disabled; counts are only visible in logs");
        }

        let monitor_config = MonitorConfig::from_core(&config.monitor, config.general.debug);
        let registry = Arc::new(CounterRegistry::new());
        let supervisor = Supervisor::new(Arc::clone(&registry), monitor_config);
        let (shutdown_tx, _) = broadcast::channel(4);

        tracing::info!(
            events = config.events.len(),
            debug = config.general.debug,
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            registry,
            supervisor,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Start every monitor and block until a shutdown signal arrives.
    ///
    /// # Shutdown Triggers
    ///
    /// - `SIGTERM` (from systemd, Docker, or `kill`)
    /// - `SIGINT` (Ctrl+C)
    pub async fn run(&mut self) -> Result<Vec<MonitorReport>> {
        let mut signals = ShutdownSignals::install()?;
        self.run_until(async move {
            let signal = signals.recv().await;
            tracing::info!(signal, "shutdown signal received");
        })
        .await
    }

    /// Start every monitor and run until `shutdown` resolves.
    ///
    /// When every monitor has stopped on its own the daemon keeps serving
    /// the final counts until `shutdown`, unless `general.exit_when_idle`
    /// is set.
    ///
    /// # Errors
    ///
    /// Fails before any monitor starts if two events share a name.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<Vec<MonitorReport>>
    where
        F: Future<Output = ()>,
    {
        self.supervisor.spawn_all(&self.config.events)?;

        let board = self.supervisor.status_board();
        let health_task = spawn_health_check_task(
            board,
            self.config.general.health_interval_secs,
            self.start_time,
            self.shutdown_tx.subscribe(),
        );
        let uptime_task = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, self.shutdown_tx.subscribe()));

        tracing::info!("entering main event loop");
        tokio::pin!(shutdown);

        let mut signalled = false;
        let reports = self
            .supervisor
            .wait(async {
                (&mut shutdown).await;
                signalled = true;
            })
            .await;

        if !signalled {
            if self.config.general.exit_when_idle {
                tracing::info!("all monitors stopped, exiting (exit_when_idle)");
            } else {
                tracing::info!("all monitors stopped; serving final counts until shutdown");
                shutdown.await;
            }
        }

        summarize(&reports);

        tracing::debug!("broadcasting shutdown signal to background tasks");
        let _ = self.shutdown_tx.send(());
        if let Err(e) = health_task.await {
            tracing::warn!(error = %e, "health check task ended abnormally");
        }
        if let Some(task) = uptime_task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "uptime updater ended abnormally");
            }
        }

        tracing::info!(
            uptime_secs = self.start_time.elapsed().as_secs(),
            "logtally-daemon stopped"
        );
        Ok(reports)
    }

    /// Current aggregated health of every monitor.
    pub fn health(&self) -> DaemonHealth {
        daemon_health(&self.supervisor.status_board(), self.start_time)
    }

    /// Shared counter registry.
    pub fn registry(&self) -> &Arc<CounterRegistry> {
        &self.registry
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &LogtallyConfig {
        &self.config
    }
}

/// Unix termination signals, installed up front so a failure is reported
/// before any monitor is spawned.
struct ShutdownSignals {
    sigterm: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    fn install() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;
        Ok(Self { sigterm, sigint })
    }

    /// Returns the name of the signal that triggered the shutdown.
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

/// Log one line per monitor report.
fn summarize(reports: &[MonitorReport]) {
    for report in reports {
        match &report.reason {
            StopReason::StartFailed(reason) => tracing::warn!(
                event = %report.event,
                reason = %reason,
                "monitor never started"
            ),
            reason => tracing::info!(
                event = %report.event,
                reason = %reason,
                lines_read = report.lines_read,
                matches = report.matches,
                "monitor summary"
            ),
        }
    }
}

/// Record the build info gauge (always 1, with version label).
fn record_build_info() {
    metrics::gauge!(DAEMON_BUILD_INFO, LABEL_VERSION => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

/// Spawn a background task that periodically updates the uptime metric.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(UPTIME_REFRESH_SECS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(DAEMON_UPTIME_SECONDS).set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
