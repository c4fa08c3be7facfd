//! Shared configuration for the warden daemon supervisor.
//!
//! Both halves of a managed daemon read this crate: the controller that
//! starts and stops it, and the detached process itself. Keeping the
//! configuration and the on-disk layout in one place means the two always
//! agree on where the pid file and the log live.
//!
//! Values are layered by [`ortho_config`]: built-in defaults, an optional
//! configuration file, `WARDEN_*` environment variables, then command-line
//! flags. Every field is optional so partial files stay valid; the accessor
//! methods on [`Config`] supply the defaults from [`defaults`]. The attempt
//! counts also seed the defaults layer, so a load with no other layer still
//! has a value to merge.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub mod defaults;
mod layout;
mod logging;

pub use defaults::default_log_format;
pub use layout::{DaemonSpec, LayoutError, daemon_name};
pub use logging::{LogFormat, LogFormatParseError};

/// Layered configuration for a supervised daemon and its controller.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, OrthoConfig)]
#[ortho_config(prefix = "WARDEN")]
pub struct Config {
    /// Directory holding the daemon's `log/` and `run/` directories.
    pub working_directory: Option<Utf8PathBuf>,
    /// Graceful stop window, in milliseconds, after the interrupt signal.
    pub stop_timeout_ms: Option<u64>,
    /// Liveness poll period, in milliseconds, while stopping.
    pub stop_poll_interval_ms: Option<u64>,
    /// Number of terminate attempts before giving up; the last sends kill.
    #[ortho_config(default = defaults::DEFAULT_TERMINATE_ATTEMPTS)]
    pub terminate_attempts: Option<u32>,
    /// Growth, in milliseconds, of the pause between terminate attempts.
    pub stop_backoff_ms: Option<u64>,
    /// Pause, in milliseconds, between spawning and the first pid check.
    pub start_delay_ms: Option<u64>,
    /// Number of pid checks made while waiting for startup.
    #[ortho_config(default = defaults::DEFAULT_START_ATTEMPTS)]
    pub start_attempts: Option<u32>,
    /// Pause, in milliseconds, between startup pid checks.
    pub start_poll_interval_ms: Option<u64>,
    /// `tracing` filter directive.
    pub log_filter: Option<String>,
    /// Output format for structured logs.
    pub log_format: Option<LogFormat>,
}

impl Config {
    /// Directory holding the daemon's runtime and log directories.
    #[must_use]
    pub fn working_directory(&self) -> &Utf8Path {
        self.working_directory
            .as_deref()
            .unwrap_or_else(|| Utf8Path::new(defaults::DEFAULT_WORKING_DIRECTORY))
    }

    /// Graceful stop window after the interrupt signal.
    #[must_use]
    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout_ms
            .map_or(defaults::DEFAULT_STOP_TIMEOUT, Duration::from_millis)
    }

    /// Liveness poll period while stopping.
    #[must_use]
    pub fn stop_poll_interval(&self) -> Duration {
        self.stop_poll_interval_ms
            .map_or(defaults::DEFAULT_STOP_POLL_INTERVAL, Duration::from_millis)
    }

    /// Number of terminate attempts; the final attempt sends kill.
    #[must_use]
    pub fn terminate_attempts(&self) -> u32 {
        self.terminate_attempts
            .unwrap_or(defaults::DEFAULT_TERMINATE_ATTEMPTS)
    }

    /// Growth of the pause between terminate attempts.
    #[must_use]
    pub fn stop_backoff(&self) -> Duration {
        self.stop_backoff_ms
            .map_or(defaults::DEFAULT_STOP_BACKOFF, Duration::from_millis)
    }

    /// Pause between spawning and the first pid check.
    #[must_use]
    pub fn start_delay(&self) -> Duration {
        self.start_delay_ms
            .map_or(defaults::DEFAULT_START_DELAY, Duration::from_millis)
    }

    /// Number of pid checks made while waiting for startup.
    #[must_use]
    pub fn start_attempts(&self) -> u32 {
        self.start_attempts
            .unwrap_or(defaults::DEFAULT_START_ATTEMPTS)
    }

    /// Pause between startup pid checks.
    #[must_use]
    pub fn start_poll_interval(&self) -> Duration {
        self.start_poll_interval_ms
            .map_or(defaults::DEFAULT_START_POLL_INTERVAL, Duration::from_millis)
    }

    /// `tracing` filter directive.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter
            .as_deref()
            .unwrap_or(defaults::DEFAULT_LOG_FILTER)
    }

    /// Output format for structured logs.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }
}
