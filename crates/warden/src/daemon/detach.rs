//! Detachment primitives behind a capability trait.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;

use nix::errno::Errno;
use nix::sys::wait::waitpid;
use nix::unistd::{self, ForkResult, Pid};
use tracing::debug;

use super::DAEMON_TARGET;
use super::error::DetachError;

/// Which side of a fork the caller is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fork {
    /// The original process; `child` is the new process id.
    Parent {
        /// Pid of the new child.
        child: u32,
    },
    /// The newly created process.
    Child,
}

/// Operating-system operations needed to detach a daemon.
pub trait Detach {
    /// Duplicates the calling process.
    ///
    /// # Errors
    ///
    /// Returns [`DetachError::Fork`] when no child could be created.
    fn fork(&self) -> Result<Fork, DetachError>;

    /// Starts a new session with the caller as leader, dropping the
    /// controlling terminal.
    ///
    /// # Errors
    ///
    /// Returns [`DetachError::SessionLeader`] when the caller already leads a
    /// process group.
    fn become_session_leader(&self) -> Result<(), DetachError>;

    /// Points stdin at the null device and stdout/stderr at `log`, opened for
    /// appending.
    ///
    /// # Errors
    ///
    /// Returns [`DetachError::Redirect`] when a file cannot be opened or a
    /// descriptor cannot be replaced.
    fn redirect_standard_streams(&self, log: &Path) -> Result<(), DetachError>;

    /// Sets the process display name. Best effort.
    fn set_process_title(&self, name: &str);

    /// Waits for a child created by [`Detach::fork`] to exit.
    ///
    /// # Errors
    ///
    /// Returns [`DetachError::Reap`] when waiting fails.
    fn reap(&self, child: u32) -> Result<(), DetachError>;
}

/// [`Detach`] implemented with POSIX calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDetach;

impl Detach for SystemDetach {
    fn fork(&self) -> Result<Fork, DetachError> {
        // SAFETY: the child only runs the detach sequence and the daemon
        // hooks before exiting; it never returns into the caller's frames.
        match unsafe { unistd::fork() } {
            Ok(ForkResult::Parent { child }) => Ok(Fork::Parent {
                child: child.as_raw().unsigned_abs(),
            }),
            Ok(ForkResult::Child) => Ok(Fork::Child),
            Err(source) => Err(DetachError::Fork { source }),
        }
    }

    fn become_session_leader(&self) -> Result<(), DetachError> {
        unistd::setsid()
            .map(drop)
            .map_err(|source| DetachError::SessionLeader { source })
    }

    fn redirect_standard_streams(&self, log: &Path) -> Result<(), DetachError> {
        let redirect_error = |source| DetachError::Redirect {
            path: log.to_path_buf(),
            source,
        };
        let null = File::open("/dev/null").map_err(redirect_error)?;
        let sink = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)
            .map_err(redirect_error)?;
        replace_descriptor(&null, libc::STDIN_FILENO).map_err(redirect_error)?;
        replace_descriptor(&sink, libc::STDOUT_FILENO).map_err(redirect_error)?;
        replace_descriptor(&sink, libc::STDERR_FILENO).map_err(redirect_error)?;
        Ok(())
    }

    fn set_process_title(&self, name: &str) {
        set_title(name);
    }

    fn reap(&self, child: u32) -> Result<(), DetachError> {
        let pid = Pid::from_raw(i32::try_from(child).map_err(|_| DetachError::Reap {
            pid: child,
            source: Errno::EINVAL,
        })?);
        loop {
            match waitpid(pid, None) {
                Ok(status) => {
                    debug!(target: DAEMON_TARGET, child, ?status, "reaped intermediate child");
                    return Ok(());
                }
                Err(Errno::EINTR) => {}
                Err(source) => return Err(DetachError::Reap { pid: child, source }),
            }
        }
    }
}

fn replace_descriptor(source: &File, target: libc::c_int) -> io::Result<()> {
    // SAFETY: both descriptors are open for the duration of the call; dup2
    // atomically closes `target` before duplicating onto it.
    if unsafe { libc::dup2(source.as_raw_fd(), target) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn set_title(name: &str) {
    let Ok(title) = std::ffi::CString::new(name) else {
        return;
    };
    // SAFETY: PR_SET_NAME reads a NUL-terminated string, truncating it to the
    // kernel's comm length; `title` outlives the call.
    let result = unsafe { libc::prctl(libc::PR_SET_NAME, title.as_ptr(), 0, 0, 0) };
    if result != 0 {
        debug!(
            target: DAEMON_TARGET,
            error = %io::Error::last_os_error(),
            "process title not set"
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn set_title(_name: &str) {}
