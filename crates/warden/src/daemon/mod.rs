//! Daemon lifecycle hooks and the detach sequence that runs them.
//!
//! A [`Daemon`] supplies three hooks. [`spawn`] detaches the calling process
//! with a double fork and runs the hooks in the background: `startup`, then
//! `run`, then always `shutdown`. The interrupt signal wakes the
//! [`Notification`] passed to `run`; the default `run` waits on it and
//! returns [`DaemonError::Interrupted`], which is the graceful path rather
//! than a crash.
//!
//! Any other failure, including a panic, is written to the log as a crash
//! report ending in the crash sentinel. A clean exit writes the stopping
//! sentinel instead.

use std::any;

use warden_config::daemon_name;

use crate::notification::Notification;

mod crash;
mod detach;
mod error;
mod lifecycle;
mod spawn;

pub use detach::{Detach, Fork, SystemDetach};
pub use error::{DaemonError, DetachError, SpawnError};
pub use spawn::spawn;

pub(crate) const DAEMON_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::daemon");

/// A long-running task managed by a [`crate::Controller`].
pub trait Daemon {
    /// Identifier used for file names and the process title.
    ///
    /// Defaults to the normalised type name, so `my_app::EchoDaemon` becomes
    /// `my-app-EchoDaemon`.
    fn name(&self) -> String {
        daemon_name(any::type_name::<Self>())
    }

    /// One-time setup such as binding a listener. Must return quickly.
    ///
    /// # Errors
    ///
    /// Any error is reported as a crash; `run` is skipped and `shutdown`
    /// still runs.
    fn startup(&mut self) -> Result<(), DaemonError> {
        Ok(())
    }

    /// The long-running body.
    ///
    /// The default blocks until `interrupt` is signalled.
    ///
    /// # Errors
    ///
    /// Return [`DaemonError::Interrupted`] when stopping because of the
    /// interrupt; any other error is reported as a crash.
    fn run(&mut self, interrupt: &Notification) -> Result<(), DaemonError> {
        interrupt.wait(None);
        Err(DaemonError::Interrupted)
    }

    /// Ends any work begun by `startup` or `run`. Runs exactly once.
    ///
    /// # Errors
    ///
    /// An error is reported as a crash unless an earlier hook already failed.
    fn shutdown(&mut self) -> Result<(), DaemonError> {
        Ok(())
    }
}

impl<D: Daemon + ?Sized> Daemon for Box<D> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn startup(&mut self) -> Result<(), DaemonError> {
        (**self).startup()
    }

    fn run(&mut self, interrupt: &Notification) -> Result<(), DaemonError> {
        (**self).run(interrupt)
    }

    fn shutdown(&mut self) -> Result<(), DaemonError> {
        (**self).shutdown()
    }
}
