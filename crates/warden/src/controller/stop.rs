//! Stop escalation against the daemon's process group.
//!
//! The sequence interrupts the group and waits out the graceful window, then
//! escalates through the terminate attempts with growing waits, the last
//! attempt sending kill. Liveness is re-checked after every signal, always
//! after a pause. A group that survives the kill is reported, not retried.

use std::fmt;
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::process_group::{ProcessGroups, StopSignal};

use super::{CONTROLLER_TARGET, ControlError, ControlOutput, Controller};

/// Progress of one stop call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStage {
    /// Nothing sent yet.
    Idle,
    /// The interrupt went out; waiting for a graceful exit.
    InterruptSent,
    /// Sending terminate with growing waits.
    TerminateLoop,
    /// The kill went out.
    Killed,
    /// The group is gone and the pid file cleared.
    Confirmed,
}

impl fmt::Display for StopStage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Idle => "idle",
            Self::InterruptSent => "interrupt-sent",
            Self::TerminateLoop => "terminate-loop",
            Self::Killed => "killed",
            Self::Confirmed => "confirmed",
        })
    }
}

/// Result of a stop call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No pid file, an unreadable one, or its process was already gone.
    NotRunning,
    /// The daemon exited and its pid file was removed.
    Stopped {
        /// Pid of the stopped daemon.
        pid: u32,
        /// Stage at which the daemon was seen to exit.
        during: StopStage,
    },
    /// The group survived every signal.
    StillRunning {
        /// Pid of the surviving daemon.
        pid: u32,
    },
}

impl<D, G: ProcessGroups, X> Controller<D, G, X> {
    /// Stops the daemon, escalating from interrupt to kill.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when output fails, a signal is refused, or
    /// the pid file cannot be cleared after the daemon exits.
    pub fn stop<W: Write, E: Write>(
        &mut self,
        output: &mut ControlOutput<W, E>,
    ) -> Result<StopOutcome, ControlError> {
        output.stdout_line(format_args!("Stopping {} daemon...", self.spec.name()))?;
        if !self.process_file.path().exists() {
            output.stderr_line(format_args!("Pid file not found. Is the daemon running?"))?;
            return Ok(StopOutcome::NotRunning);
        }
        let Some(pid) = self.process_file.recall() else {
            output.stderr_line(format_args!(
                "Pid file {} holds no pid. Has daemon crashed?",
                self.process_file.path().display()
            ))?;
            self.tail_log(output)?;
            return Ok(StopOutcome::NotRunning);
        };
        let Some(pgid) = self.groups.group_of(pid) else {
            output.stderr_line(format_args!("Pid {pid} is not running. Has daemon crashed?"))?;
            self.tail_log(output)?;
            return Ok(StopOutcome::NotRunning);
        };

        let mut escalation = Escalation {
            groups: &self.groups,
            pid,
            pgid,
            stage: StopStage::Idle,
        };
        let policy = self.settings.stop;

        escalation.advance(StopStage::InterruptSent);
        escalation.send(StopSignal::Interrupt, output)?;
        let mut exited = escalation.wait_for_exit(policy.timeout, policy.poll_interval);

        let attempts = policy.effective_attempts();
        let mut attempt = 0;
        while !exited && attempt < attempts {
            attempt += 1;
            let signal = if attempt == attempts {
                escalation.advance(StopStage::Killed);
                StopSignal::Kill
            } else {
                escalation.advance(StopStage::TerminateLoop);
                StopSignal::Terminate
            };
            escalation.send(signal, output)?;
            let wait = policy.escalation_wait(attempt);
            output.stdout_line(format_args!(
                "Waiting for {:.1}s for daemon to terminate...",
                wait.as_secs_f64()
            ))?;
            exited = escalation.wait_for_exit(wait, policy.poll_interval);
        }

        if !exited {
            warn!(
                target: CONTROLLER_TARGET,
                pid,
                pgid,
                stage = %escalation.stage,
                "daemon survived stop escalation"
            );
            output.stderr_line(format_args!("Daemon appears to be still running!"))?;
            return Ok(StopOutcome::StillRunning { pid });
        }

        let during = escalation.stage;
        escalation.advance(StopStage::Confirmed);
        self.process_file.clear()?;
        output.stdout_line(format_args!("Daemon has left the building."))?;
        info!(target: CONTROLLER_TARGET, pid, %during, "daemon stopped");
        Ok(StopOutcome::Stopped { pid, during })
    }
}

struct Escalation<'a, G: ?Sized> {
    groups: &'a G,
    pid: u32,
    pgid: u32,
    stage: StopStage,
}

impl<G: ProcessGroups + ?Sized> Escalation<'_, G> {
    fn advance(&mut self, next: StopStage) {
        if self.stage != next {
            debug!(
                target: CONTROLLER_TARGET,
                pid = self.pid,
                from = %self.stage,
                to = %next,
                "stop stage transition"
            );
            self.stage = next;
        }
    }

    fn send<W: Write, E: Write>(
        &self,
        signal: StopSignal,
        output: &mut ControlOutput<W, E>,
    ) -> Result<(), ControlError> {
        output.stdout_line(format_args!(
            "Sending {signal} to process group {}...",
            self.pgid
        ))?;
        self.groups.signal_group(self.pgid, signal)?;
        Ok(())
    }

    fn alive(&self) -> bool {
        self.groups.group_of(self.pid).is_some()
    }

    /// Polls until the daemon is gone or `window` elapses, pausing before
    /// every check.
    fn wait_for_exit(&self, window: Duration, poll_interval: Duration) -> bool {
        let deadline = Instant::now() + window;
        let poll_interval = poll_interval.max(Duration::from_millis(1));
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            thread::sleep(poll_interval.min(remaining));
            if !self.alive() {
                return true;
            }
            if remaining <= poll_interval {
                return false;
            }
        }
    }
}
