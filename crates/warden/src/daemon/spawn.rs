//! The double-fork sequence that turns the caller into a controller with a
//! detached daemon.
//!
//! The caller prepares the directories, marks the log and forks. The first
//! child starts a new session and forks again, exiting at once so the
//! grandchild can never reacquire a controlling terminal. The grandchild
//! records its pid, moves into the working directory, points its standard
//! streams at the log and runs the daemon hooks. It never returns.

use std::error::Error as StdError;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::process;
use std::sync::Arc;

use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::stat::{Mode, umask};
use signal_hook::consts::signal::SIGINT;
use signal_hook::low_level;
use tracing::{debug, info};
use warden_config::DaemonSpec;

use crate::log_file::LogFile;
use crate::notification::Notification;
use crate::process_file::ProcessFile;
use crate::sentinel;

use super::crash::{self, CrashReport};
use super::detach::{Detach, Fork};
use super::error::SpawnError;
use super::lifecycle::run_hooks;
use super::{DAEMON_TARGET, Daemon};

const FAILURE_EXIT_CODE: i32 = 1;

/// Detaches `daemon` into the background and returns in the caller once the
/// intermediate child has exited.
///
/// The returned pid is that of the intermediate child, which also names the
/// daemon's session and process group. The daemon's own pid is recorded in
/// the pid file by the daemon itself.
///
/// # Errors
///
/// Returns [`SpawnError`] when the directories cannot be prepared, the log
/// cannot be marked, or the first fork fails.
pub fn spawn<D, X>(daemon: &mut D, spec: &DaemonSpec, detach: &X) -> Result<u32, SpawnError>
where
    D: Daemon + ?Sized,
    X: Detach + ?Sized,
{
    spec.prepare_directories()?;
    LogFile::new(spec.log_file_path())
        .mark(process::id())
        .map_err(|source| SpawnError::MarkLog {
            path: spec.log_file_path().to_path_buf(),
            source,
        })?;

    match detach.fork()? {
        Fork::Parent { child } => {
            debug!(target: DAEMON_TARGET, child, "forked intermediate child");
            detach.reap(child)?;
            Ok(child)
        }
        Fork::Child => detached_child(daemon, spec, detach),
    }
}

fn detached_child<D, X>(daemon: &mut D, spec: &DaemonSpec, detach: &X) -> !
where
    D: Daemon + ?Sized,
    X: Detach + ?Sized,
{
    // SAFETY: restoring the default disposition installs no handler code.
    if let Err(error) = unsafe { signal::signal(Signal::SIGINT, SigHandler::SigDfl) } {
        abandon(spec, "SignalError", &error);
    }
    if let Err(error) = detach.become_session_leader() {
        abandon(spec, "DetachError", &error);
    }
    match detach.fork() {
        Ok(Fork::Parent { .. }) => exit_immediately(0),
        Ok(Fork::Child) => daemon_process(daemon, spec, detach),
        Err(error) => abandon(spec, "DetachError", &error),
    }
}

fn daemon_process<D, X>(daemon: &mut D, spec: &DaemonSpec, detach: &X) -> !
where
    D: Daemon + ?Sized,
    X: Detach + ?Sized,
{
    let pid = process::id();
    if let Err(error) = ProcessFile::new(spec.process_file_path()).store(pid) {
        abandon(spec, "ProcessFileError", &error);
    }
    umask(Mode::empty());
    if let Err(error) = std::env::set_current_dir(spec.working_directory()) {
        abandon(spec, "IoError", &error);
    }
    if let Err(error) = detach.redirect_standard_streams(spec.log_file_path()) {
        abandon(spec, "DetachError", &error);
    }
    detach.set_process_title(spec.name());

    let interrupt = match Notification::new() {
        Ok(notification) => Arc::new(notification),
        Err(error) => abandon(spec, "NotificationError", &error),
    };
    let handler_interrupt = Arc::clone(&interrupt);
    // SAFETY: the handler only calls `Notification::signal`, which performs
    // an atomic store and a non-blocking write.
    let registered = unsafe { low_level::register(SIGINT, move || handler_interrupt.signal()) };
    if let Err(error) = registered {
        abandon(spec, "SignalError", &error);
    }
    crash::install_panic_hook();

    info!(target: DAEMON_TARGET, pid, name = spec.name(), "daemon started");
    let failure = run_hooks(daemon, &interrupt);
    info!(target: DAEMON_TARGET, pid, crashed = failure.is_some(), "daemon finished");

    match failure {
        Some(report) => {
            let _ = append_to_log(spec.log_file_path(), |log| report.write_to(log));
            process::exit(FAILURE_EXIT_CODE)
        }
        None => {
            let _ = append_to_log(spec.log_file_path(), |log| {
                writeln!(log, "{}", sentinel::daemon_stopping())
            });
            process::exit(0)
        }
    }
}

/// Records a failure of the detach sequence itself and exits.
fn abandon(spec: &DaemonSpec, kind: &str, error: &(dyn StdError + 'static)) -> ! {
    let report = CrashReport::from_error(kind, error);
    let _ = append_to_log(spec.log_file_path(), |log| report.write_to(log));
    exit_immediately(FAILURE_EXIT_CODE)
}

/// Appends through a fresh handle so nothing depends on the state of the
/// standard stream locks inherited across the fork.
fn append_to_log<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut std::fs::File) -> io::Result<()>,
{
    let mut log = OpenOptions::new().create(true).append(true).open(path)?;
    write(&mut log)
}

/// Leaves without running exit handlers or unwinding into the caller's
/// frames, which belong to the process that forked.
fn exit_immediately(code: i32) -> ! {
    // SAFETY: `_exit(2)` terminates the process and is async-signal-safe.
    unsafe { libc::_exit(code) }
}
