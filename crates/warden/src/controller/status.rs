//! Status reporting and crash dumps.

use std::io::Write;

use crate::process_file::DaemonState;
use crate::process_group::ProcessGroups;

use super::{ControlError, ControlOutput, Controller};

impl<D, G: ProcessGroups, X> Controller<D, G, X> {
    /// Classifies the daemon from its pid file and process group.
    pub fn status(&self) -> DaemonState {
        self.process_file.status(&self.groups)
    }

    /// Whether the log ends with a crash report.
    pub fn crashed(&self) -> bool {
        self.log_file.crashed()
    }

    /// Prints the daemon status, dumping the crash log when the daemon died
    /// with a crash report.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when output fails or the log cannot be read.
    pub fn show_status<W: Write, E: Write>(
        &self,
        output: &mut ControlOutput<W, E>,
    ) -> Result<DaemonState, ControlError> {
        let state = self.status();
        match state {
            DaemonState::Running => {
                let pid = self.pid().map_or_else(|| "?".to_owned(), |pid| pid.to_string());
                output.stdout_line(format_args!("Daemon status: running pid={pid}"))?;
            }
            DaemonState::Stopped => {
                output.stdout_line(format_args!("Daemon status: stopped"))?;
            }
            DaemonState::Unknown if self.crashed() => {
                output.stdout_line(format_args!("Daemon status: crashed"))?;
                self.tail_log(output)?;
            }
            DaemonState::Unknown => {
                output.stdout_line(format_args!("Daemon status: unknown"))?;
            }
        }
        Ok(state)
    }

    /// Writes the output of the most recent crash to stderr.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when output fails or the log cannot be read.
    pub fn tail_log<W: Write, E: Write>(
        &self,
        output: &mut ControlOutput<W, E>,
    ) -> Result<(), ControlError> {
        let lines = self
            .log_file
            .crash_tail()
            .map_err(|source| ControlError::ReadLog {
                path: self.log_file.path().to_path_buf(),
                source,
            })?;
        output.stderr_line(format_args!("Dumping daemon crash log:"))?;
        for line in lines {
            output.stderr_line(format_args!("\t{line}"))?;
        }
        Ok(())
    }
}
