//! Single-daemon supervisor.
//!
//! Turns a long-running task into a detached background process with a start,
//! stop, restart and status lifecycle, crash detection, and an escalating
//! shutdown.
//!
//! - [`daemon`] defines the lifecycle hooks and the double-fork detach.
//! - [`controller`] starts, stops and inspects one daemon.
//! - [`process_file`] records the daemon's pid and classifies its state.
//! - [`process_group`] probes and signals the daemon's process group.
//! - [`log_file`] reads the daemon log backwards for crash diagnostics.
//! - [`notification`] is the cross-process, signal-safe wake-up.
//! - [`sentinel`] holds the fixed lifecycle log lines.
//! - [`telemetry`] installs the structured logger.
//!
//! A daemon and its controller share the layout and settings in
//! [`warden_config`].

pub mod controller;
pub mod daemon;
pub mod log_file;
pub mod notification;
pub mod process_file;
pub mod process_group;
pub mod sentinel;
pub mod telemetry;

#[cfg(test)]
mod tests;

pub use controller::{
    ControlError, ControlOutput, ControlSettings, Controller, LifecycleCommand, StopOutcome,
    StopStage,
};
pub use daemon::{Daemon, DaemonError, SpawnError};
pub use log_file::LogFile;
pub use notification::{Notification, NotificationError};
pub use process_file::{DaemonState, ProcessFile, ProcessFileError};
pub use process_group::{ProcessGroups, SignalError, StopSignal, SystemProcessGroups};
pub use warden_config::{Config, DaemonSpec};
