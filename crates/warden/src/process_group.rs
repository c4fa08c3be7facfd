//! Process-group probing and signalling.
//!
//! A detached daemon leads (or belongs to) its own process group, and every
//! stop signal targets that group rather than a single pid so that children
//! the daemon spawned are not orphaned. The [`ProcessGroups`] trait keeps
//! group-wide signalling separate from any single-process API and lets the
//! controller's stop sequence run against a scripted implementation in tests.

use std::fmt;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::{self, Pid};
use thiserror::Error;

/// Signals the controller may deliver to a daemon's process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopSignal {
    /// Graceful interrupt, handled by the daemon's notification.
    Interrupt,
    /// Catchable terminate request used during escalation.
    Terminate,
    /// Forceful kill; cannot be caught or ignored.
    Kill,
}

impl StopSignal {
    /// Short signal name as operators know it.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Interrupt => "INT",
            Self::Terminate => "TERM",
            Self::Kill => "KILL",
        }
    }

    const fn as_nix(self) -> Signal {
        match self {
            Self::Interrupt => Signal::SIGINT,
            Self::Terminate => Signal::SIGTERM,
            Self::Kill => Signal::SIGKILL,
        }
    }
}

impl fmt::Display for StopSignal {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

/// Errors raised while signalling a process group.
#[derive(Debug, Error)]
pub enum SignalError {
    /// The group id cannot name a signallable group.
    #[error("invalid process group {pgid}: {reason}")]
    InvalidGroup {
        /// Rejected group id.
        pgid: u32,
        /// Why the id was rejected.
        reason: &'static str,
    },
    /// The kernel refused to deliver the signal.
    #[error("failed to send {signal} to process group {pgid}: {source}")]
    Delivery {
        /// Target group.
        pgid: u32,
        /// Signal that could not be sent.
        signal: StopSignal,
        /// Underlying errno.
        #[source]
        source: Errno,
    },
}

/// Capability for probing and signalling process groups.
pub trait ProcessGroups {
    /// Returns the process group of `pid` while that process is alive.
    ///
    /// Any probe failure, including "no such process", yields `None`.
    fn group_of(&self, pid: u32) -> Option<u32>;

    /// Delivers `signal` to every member of group `pgid`.
    ///
    /// A group that no longer exists is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] when the id is invalid or delivery is refused.
    fn signal_group(&self, pgid: u32, signal: StopSignal) -> Result<(), SignalError>;
}

/// [`ProcessGroups`] backed by `getpgid(2)` and `killpg(3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessGroups;

impl ProcessGroups for SystemProcessGroups {
    fn group_of(&self, pid: u32) -> Option<u32> {
        // Zero would name the calling process.
        let raw = i32::try_from(pid).ok().filter(|raw| *raw > 0)?;
        let pgid = unistd::getpgid(Some(Pid::from_raw(raw))).ok()?;
        if is_zombie(raw) {
            return None;
        }
        u32::try_from(pgid.as_raw()).ok()
    }

    fn signal_group(&self, pgid: u32, signal: StopSignal) -> Result<(), SignalError> {
        let raw = validate_group(pgid)?;
        match signal::killpg(Pid::from_raw(raw), signal.as_nix()) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(source) => Err(SignalError::Delivery {
                pgid,
                signal,
                source,
            }),
        }
    }
}

fn validate_group(pgid: u32) -> Result<i32, SignalError> {
    match i32::try_from(pgid) {
        Ok(0) => Err(SignalError::InvalidGroup {
            pgid,
            reason: "group 0 would target the caller's own process group",
        }),
        Ok(1) => Err(SignalError::InvalidGroup {
            pgid,
            reason: "group 1 belongs to init",
        }),
        Ok(raw) => Ok(raw),
        Err(_) => Err(SignalError::InvalidGroup {
            pgid,
            reason: "exceeds the platform pid range",
        }),
    }
}

/// An exited but unreaped process still answers `getpgid`; it is not alive.
#[cfg(target_os = "linux")]
fn is_zombie(pid: i32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    // The command name is parenthesised and may itself contain spaces or
    // parentheses, so the state field is located after the last ')'.
    stat.rfind(')')
        .and_then(|index| stat.get(index + 1..))
        .and_then(|rest| rest.split_whitespace().next())
        .is_some_and(|state| state == "Z")
}

#[cfg(not(target_os = "linux"))]
fn is_zombie(_pid: i32) -> bool {
    false
}
