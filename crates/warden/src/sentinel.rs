//! Fixed log lines marking lifecycle events.
//!
//! External tooling and the crash detector match these lines verbatim, so
//! they are written raw rather than through `tracing`.

use std::time::{SystemTime, UNIX_EPOCH};

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Prefix of the line delimiting one activation's output from the next.
pub const LOG_MARKED_PREFIX: &str = "=== Log Marked @ ";
/// Prefix of the line opening a crash report.
pub const EXCEPTION_BACKTRACE_PREFIX: &str = "=== Daemon Exception Backtrace @ ";
/// Line closing a crash report.
pub const DAEMON_CRASHED: &str = "=== Daemon Crashed ===";
/// Prefix of the line written when a daemon exits normally.
pub const DAEMON_STOPPING_PREFIX: &str = "=== Daemon Stopping @ ";

/// `=== Log Marked @ <timestamp> [<pid>] ===`
#[must_use]
pub fn log_marked(pid: u32) -> String {
    format!("{LOG_MARKED_PREFIX}{} [{pid}] ===", timestamp())
}

/// `=== Daemon Exception Backtrace @ <timestamp> ===`
#[must_use]
pub fn exception_backtrace() -> String {
    format!("{EXCEPTION_BACKTRACE_PREFIX}{} ===", timestamp())
}

/// `=== Daemon Stopping @ <timestamp> ===`
#[must_use]
pub fn daemon_stopping() -> String {
    format!("{DAEMON_STOPPING_PREFIX}{} ===", timestamp())
}

/// Whether `line` starts a crash report or an activation, the points where
/// a crash tail stops scanning backward.
#[must_use]
pub fn is_crash_tail_boundary(line: &str) -> bool {
    line.starts_with(LOG_MARKED_PREFIX) || line.starts_with(EXCEPTION_BACKTRACE_PREFIX)
}

fn timestamp() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        format!("@{seconds}")
    })
}
