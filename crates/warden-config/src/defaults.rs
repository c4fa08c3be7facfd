//! Built-in values used when no configuration layer sets a field.

use std::time::Duration;

/// Default working directory; `log/` and `run/` live beneath it.
pub const DEFAULT_WORKING_DIRECTORY: &str = ".";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// How long the daemon may take to exit after the interrupt signal.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Liveness poll period while a stop is in progress.
pub const DEFAULT_STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Number of escalation attempts; the last one sends `SIGKILL`.
pub const DEFAULT_TERMINATE_ATTEMPTS: u32 = 5;

/// Growth of the pause between escalation attempts, spread across all
/// attempts.
pub const DEFAULT_STOP_BACKOFF: Duration = Duration::from_secs(3);

/// Pause between spawning the daemon and the first pid check.
pub const DEFAULT_START_DELAY: Duration = Duration::from_millis(100);

/// Number of pid checks made while waiting for the daemon to start.
pub const DEFAULT_START_ATTEMPTS: u32 = 5;

/// Pause between pid checks while waiting for the daemon to start.
pub const DEFAULT_START_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Compact
}
