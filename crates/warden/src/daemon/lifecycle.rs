//! Runs a daemon's hooks in order inside the detached process.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::{error, info};

use crate::notification::Notification;

use super::crash::CrashReport;
use super::{DAEMON_TARGET, Daemon};

/// Runs `startup` then `run`, and always `shutdown`.
///
/// Interruption is the graceful path and yields `None`. Any other error or
/// panic yields the report for the first failure; a later failure in
/// `shutdown` is logged but does not replace it.
pub(crate) fn run_hooks<D: Daemon + ?Sized>(
    daemon: &mut D,
    interrupt: &Notification,
) -> Option<CrashReport> {
    let body = catch_unwind(AssertUnwindSafe(|| {
        daemon.startup()?;
        daemon.run(interrupt)
    }));
    let mut failure = match body {
        Ok(Ok(())) => None,
        Ok(Err(error)) if error.is_interrupted() => {
            info!(target: DAEMON_TARGET, "interrupted, proceeding to shutdown");
            None
        }
        Ok(Err(error)) => Some(CrashReport::from_daemon_error(&error)),
        Err(payload) => Some(CrashReport::from_panic(payload.as_ref())),
    };

    let shutdown = match catch_unwind(AssertUnwindSafe(|| daemon.shutdown())) {
        Ok(Ok(())) => None,
        Ok(Err(error)) if error.is_interrupted() => None,
        Ok(Err(error)) => {
            error!(target: DAEMON_TARGET, %error, "shutdown failed");
            Some(CrashReport::from_daemon_error(&error))
        }
        Err(payload) => {
            error!(target: DAEMON_TARGET, "shutdown panicked");
            Some(CrashReport::from_panic(payload.as_ref()))
        }
    };
    if failure.is_none() {
        failure = shutdown;
    }
    failure
}
