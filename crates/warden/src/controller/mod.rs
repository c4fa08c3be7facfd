//! Lifecycle management for one daemon instance.
//!
//! This module is split into focused submodules so each concern remains small
//! and testable:
//! - [`types`] defines the commands, output helper and timing policies.
//! - [`error`] captures the error surface.
//! - [`start`] detaches the daemon and waits for its pid.
//! - [`stop`] runs the signal escalation.
//! - [`status`] classifies the daemon and dumps crash output.

mod error;
mod start;
mod status;
mod stop;
#[cfg(test)]
mod stop_tests;
mod types;

use std::io::Write;
use std::process::ExitCode;

use tracing::info;
use warden_config::{Config, DaemonSpec, LayoutError};

use crate::daemon::{Daemon, SystemDetach};
use crate::log_file::LogFile;
use crate::process_file::{DaemonState, ProcessFile};
use crate::process_group::{ProcessGroups, StopSignal, SystemProcessGroups};

pub use error::ControlError;
pub use stop::{StopOutcome, StopStage};
pub use types::{
    ControlOutput, ControlSettings, LifecycleCommand, StartPolicy, StopPolicy, UnknownCommand,
};

pub(crate) const CONTROLLER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::controller");

const INVALID_COMMAND: &str = "Invalid command. Please specify start, restart, stop or status.";

/// Starts, stops and inspects one daemon.
///
/// Owns the daemon value, its layout and the collaborators used to detach
/// it and to probe and signal its process group.
#[derive(Debug)]
pub struct Controller<D, G = SystemProcessGroups, X = SystemDetach> {
    daemon: D,
    spec: DaemonSpec,
    settings: ControlSettings,
    groups: G,
    detach: X,
    process_file: ProcessFile,
    log_file: LogFile,
}

impl<D: Daemon> Controller<D> {
    /// Builds a controller rooted at the configured working directory, named
    /// after [`Daemon::name`].
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError`] when the working directory cannot be resolved.
    pub fn from_config(daemon: D, config: &Config) -> Result<Self, LayoutError> {
        let spec = DaemonSpec::from_config(&daemon.name(), config)?;
        Ok(Self::new(daemon, spec, ControlSettings::from(config)))
    }

    /// Builds a controller for an explicit layout.
    pub fn new(daemon: D, spec: DaemonSpec, settings: ControlSettings) -> Self {
        Self {
            process_file: ProcessFile::new(spec.process_file_path()),
            log_file: LogFile::new(spec.log_file_path()),
            daemon,
            spec,
            settings,
            groups: SystemProcessGroups,
            detach: SystemDetach,
        }
    }
}

impl<D, G, X> Controller<D, G, X> {
    /// Replaces the process-group capability.
    pub fn with_process_groups<H: ProcessGroups>(self, groups: H) -> Controller<D, H, X> {
        Controller {
            daemon: self.daemon,
            spec: self.spec,
            settings: self.settings,
            groups,
            detach: self.detach,
            process_file: self.process_file,
            log_file: self.log_file,
        }
    }

    /// Replaces the detach capability.
    pub fn with_detach<Y>(self, detach: Y) -> Controller<D, G, Y> {
        Controller {
            daemon: self.daemon,
            spec: self.spec,
            settings: self.settings,
            groups: self.groups,
            detach,
            process_file: self.process_file,
            log_file: self.log_file,
        }
    }

    /// Layout of the managed daemon.
    pub fn spec(&self) -> &DaemonSpec {
        &self.spec
    }

    /// Timing in effect.
    pub fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    /// Process-group capability in use.
    pub fn process_groups(&self) -> &G {
        &self.groups
    }

    /// Detach capability in use.
    pub fn detach(&self) -> &X {
        &self.detach
    }

    /// The daemon's pid file.
    pub fn process_file(&self) -> &ProcessFile {
        &self.process_file
    }

    /// The daemon's log.
    pub fn log_file(&self) -> &LogFile {
        &self.log_file
    }

    /// Pid recorded by the running (or crashed) daemon.
    pub fn pid(&self) -> Option<u32> {
        self.process_file.recall()
    }
}

impl<D, G, X> Controller<D, G, X>
where
    D: Daemon,
    G: ProcessGroups,
    X: crate::daemon::Detach,
{
    /// Dispatches a textual command and reports whether it succeeded.
    ///
    /// Anything other than `start`, `stop`, `restart` or `status` is reported
    /// as a usage error without touching the daemon.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when output, spawning, signalling or pid file
    /// maintenance fails.
    pub fn daemonize<W: Write, E: Write>(
        &mut self,
        command: &str,
        output: &mut ControlOutput<W, E>,
    ) -> Result<ExitCode, ControlError> {
        let Ok(command) = command.parse::<LifecycleCommand>() else {
            output.stderr_line(format_args!("{INVALID_COMMAND}"))?;
            return Ok(ExitCode::FAILURE);
        };
        if self.execute(command, output)? {
            Ok(ExitCode::SUCCESS)
        } else {
            Ok(ExitCode::FAILURE)
        }
    }

    /// Runs one lifecycle command, then prints the resulting status.
    ///
    /// Returns `false` when a start leaves the daemon not running or a stop
    /// leaves it alive.
    ///
    /// # Errors
    ///
    /// As [`Controller::daemonize`].
    pub fn execute<W: Write, E: Write>(
        &mut self,
        command: LifecycleCommand,
        output: &mut ControlOutput<W, E>,
    ) -> Result<bool, ControlError> {
        info!(target: CONTROLLER_TARGET, %command, name = self.spec.name(), "lifecycle command");
        match command {
            LifecycleCommand::Start => {
                self.start(output)?;
                Ok(self.show_status(output)? == DaemonState::Running)
            }
            LifecycleCommand::Stop => {
                let outcome = self.stop(output)?;
                self.show_status(output)?;
                self.cleanup()?;
                Ok(!matches!(outcome, StopOutcome::StillRunning { .. }))
            }
            LifecycleCommand::Restart => self.restart(output),
            LifecycleCommand::Status => {
                self.show_status(output)?;
                Ok(true)
            }
        }
    }

    /// Stops the daemon, clears any leftover pid file, starts it again and
    /// prints the resulting status. Returns whether it ends up running.
    ///
    /// # Errors
    ///
    /// As [`Controller::daemonize`].
    pub fn restart<W: Write, E: Write>(
        &mut self,
        output: &mut ControlOutput<W, E>,
    ) -> Result<bool, ControlError> {
        self.stop(output)?;
        self.cleanup()?;
        self.start(output)?;
        Ok(self.show_status(output)? == DaemonState::Running)
    }

    /// Clears the pid file unless it names a live process.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::ProcessFile`] when removal fails.
    pub fn cleanup(&self) -> Result<(), ControlError> {
        Ok(self.process_file.cleanup(&self.groups)?)
    }

    /// Sends `signal` to the daemon's process group. Returns whether a live
    /// group was found.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Signal`] when delivery is refused.
    pub fn kill(&self, signal: StopSignal) -> Result<bool, ControlError> {
        let Some(pgid) = self.pid().and_then(|pid| self.groups.group_of(pid)) else {
            return Ok(false);
        };
        self.groups.signal_group(pgid, signal)?;
        Ok(true)
    }
}
