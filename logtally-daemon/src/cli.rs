//! CLI argument definitions for logtally-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use logtally_core::config::LogtallyConfig;

/// Count pattern matches in the output of long-running commands and
/// expose the counts as Prometheus metrics.
#[derive(Parser, Debug)]
#[command(name = "logtally-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to the configuration file (`.toml` or `.json`).
    #[arg(short, long, default_value = "/etc/logtally/logtally.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log every launched command and every pattern match at info level.
    #[arg(short, long)]
    pub debug: bool,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut LogtallyConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
        if self.debug {
            config.general.debug = true;
        }
    }
}
