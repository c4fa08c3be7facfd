//! One-shot wake-up signal built on a self-pipe.
//!
//! A [`Notification`] is created before forking and shared by both sides of
//! the fork: the pipe descriptors survive `fork(2)`, so a byte written by one
//! process makes the read end readable in every process holding it.
//! [`Notification::signal`] performs one atomic store and one non-blocking
//! `write(2)`, both async-signal-safe, so it may run inside a signal handler.
//!
//! The byte is never consumed. Once signalled, the read end stays readable
//! and every later check or wait in any process observes the signal.

use std::io::{self, PipeReader, PipeWriter};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Errors raised while creating a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// The underlying pipe could not be created.
    #[error("failed to create notification pipe: {source}")]
    Pipe {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The write end could not be switched to non-blocking mode.
    #[error("failed to configure notification pipe: {source}")]
    Configure {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Cross-process, signal-handler-safe one-shot notification.
#[derive(Debug)]
pub struct Notification {
    signalled: AtomicBool,
    reader: PipeReader,
    writer: PipeWriter,
}

impl Notification {
    /// Creates an unsignalled notification.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationError`] when the pipe cannot be created or
    /// configured.
    pub fn new() -> Result<Self, NotificationError> {
        let (reader, writer) = io::pipe().map_err(|source| NotificationError::Pipe { source })?;
        set_nonblocking(writer.as_raw_fd())
            .map_err(|source| NotificationError::Configure { source })?;
        Ok(Self {
            signalled: AtomicBool::new(false),
            reader,
            writer,
        })
    }

    /// Marks the notification signalled and wakes every waiter.
    ///
    /// Idempotent. Performs no allocation and takes no locks.
    pub fn signal(&self) {
        self.signalled.store(true, Ordering::SeqCst);
        let byte = [1_u8];
        // SAFETY: write(2) is async-signal-safe and the one-byte buffer lives
        // for the duration of the call. The descriptor is non-blocking, so a
        // full pipe fails with EAGAIN instead of blocking.
        let _ = unsafe { libc::write(self.writer.as_raw_fd(), byte.as_ptr().cast(), 1) };
    }

    /// Reports whether the notification has been signalled, in this process
    /// or any other sharing the pipe. Never blocks.
    pub fn is_signalled(&self) -> bool {
        if self.signalled.load(Ordering::SeqCst) {
            return true;
        }
        if matches!(poll_readable(self.reader.as_raw_fd(), 0), Ok(true)) {
            self.signalled.store(true, Ordering::SeqCst);
            return true;
        }
        false
    }

    /// Blocks until signalled or until `timeout` elapses.
    ///
    /// `None` waits indefinitely. Returns whether the notification was
    /// signalled. A signal that completed before the call returns `true`
    /// without blocking.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        loop {
            if self.is_signalled() {
                return true;
            }
            let timeout_ms = match deadline {
                None => -1,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return false;
                    }
                    millis_rounded_up(remaining)
                }
            };
            match poll_readable(self.reader.as_raw_fd(), timeout_ms) {
                Ok(true) => {
                    self.signalled.store(true, Ordering::SeqCst);
                    return true;
                }
                // Timed out, or the pipe reported an error condition.
                Ok(false) => return self.signalled.load(Ordering::SeqCst),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => return self.signalled.load(Ordering::SeqCst),
            }
        }
    }
}

fn millis_rounded_up(duration: Duration) -> i32 {
    let millis = duration.as_nanos().div_ceil(1_000_000);
    i32::try_from(millis).unwrap_or(i32::MAX)
}

fn poll_readable(fd: RawFd, timeout_ms: i32) -> io::Result<bool> {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: `pollfd` is a valid, exclusively borrowed array of length one
    // for the duration of the call.
    let ready = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
    match ready {
        -1 => Err(io::Error::last_os_error()),
        0 => Ok(false),
        _ => Ok(pollfd.revents & libc::POLLIN != 0),
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl(2) on a descriptor owned by the caller; F_GETFL takes no
    // extra argument.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above; F_SETFL takes the integer flag set.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
