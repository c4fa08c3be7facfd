//! Detaching the daemon and waiting for it to record its pid.

use std::io::Write;
use std::thread;

use tracing::{debug, warn};

use crate::daemon::{self, Daemon, Detach};
use crate::process_file::DaemonState;
use crate::process_group::ProcessGroups;

use super::{CONTROLLER_TARGET, ControlError, ControlOutput, Controller};

impl<D, G, X> Controller<D, G, X>
where
    D: Daemon,
    G: ProcessGroups,
    X: Detach,
{
    /// Starts the daemon unless it is already running.
    ///
    /// A pid file whose process is gone is cleared first. After detaching,
    /// the pid file is polled within the start budget, giving up early when
    /// the log shows a crash. Failing to start is not an error: the returned
    /// state, and the crash log, say what happened.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when output fails, the stale pid file cannot
    /// be cleared, or the detach sequence fails before the fork.
    pub fn start<W: Write, E: Write>(
        &mut self,
        output: &mut ControlOutput<W, E>,
    ) -> Result<DaemonState, ControlError> {
        output.stdout_line(format_args!("Starting {} daemon...", self.spec.name()))?;
        match self.status() {
            DaemonState::Running => {
                output.stdout_line(format_args!("Daemon already running!"))?;
                return Ok(DaemonState::Running);
            }
            DaemonState::Unknown => {
                output.stderr_line(format_args!(
                    "Daemon in unknown state! Will clear previous state and continue."
                ))?;
                warn!(
                    target: CONTROLLER_TARGET,
                    path = %self.process_file.path().display(),
                    "clearing stale pid file"
                );
                self.process_file.clear()?;
            }
            DaemonState::Stopped => {}
        }

        let intermediate = daemon::spawn(&mut self.daemon, &self.spec, &self.detach)?;
        debug!(target: CONTROLLER_TARGET, intermediate, "daemon detached");
        self.wait_for_start(output)?;
        Ok(self.status())
    }

    fn wait_for_start<W: Write, E: Write>(
        &self,
        output: &mut ControlOutput<W, E>,
    ) -> Result<(), ControlError> {
        let policy = self.settings.start;
        thread::sleep(policy.delay);
        for attempt in 1..=policy.attempts {
            if let Some(pid) = self.process_file.recall() {
                debug!(target: CONTROLLER_TARGET, pid, attempt, "daemon recorded its pid");
                return Ok(());
            }
            if self.log_file.crashed_since_mark() {
                warn!(target: CONTROLLER_TARGET, attempt, "daemon crashed during startup");
                return Ok(());
            }
            output.stdout_line(format_args!(
                "Waiting for daemon to start ({attempt}/{})",
                policy.attempts
            ))?;
            thread::sleep(policy.poll_interval);
        }
        warn!(
            target: CONTROLLER_TARGET,
            attempts = policy.attempts,
            "daemon did not record a pid within the start budget"
        );
        Ok(())
    }
}
