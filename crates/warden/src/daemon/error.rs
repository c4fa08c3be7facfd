//! Error surface of daemon hooks and of the detach sequence.

use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;
use warden_config::LayoutError;

/// Failure returned by a daemon lifecycle hook.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The interrupt notification fired; `shutdown` follows normally.
    #[error("daemon interrupted")]
    Interrupted,
    /// An IO operation failed.
    #[error("{context}: {source}")]
    Io {
        /// What the daemon was doing.
        context: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The daemon gave up for a reason of its own.
    #[error("{message}")]
    Failed {
        /// Human-readable reason.
        message: String,
    },
    /// Any other error raised by daemon code.
    #[error("{0}")]
    Other(#[source] Box<dyn StdError + Send + Sync>),
}

impl DaemonError {
    /// Wraps an IO error with a description of the failed operation.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Builds a [`DaemonError::Failed`] from a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Boxes an arbitrary error.
    pub fn other(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(error))
    }

    /// Stable name written as the error kind in crash reports.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Interrupted => "Interrupted",
            Self::Io { .. } => "IoError",
            Self::Failed { .. } => "Failed",
            Self::Other(_) => "Error",
        }
    }

    /// Whether this is the graceful interruption rather than a failure.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Errors from the detach capability.
#[derive(Debug, Error)]
pub enum DetachError {
    /// `fork(2)` failed.
    #[error("failed to fork: {source}")]
    Fork {
        /// Underlying errno.
        #[source]
        source: Errno,
    },
    /// `setsid(2)` failed.
    #[error("failed to become session leader: {source}")]
    SessionLeader {
        /// Underlying errno.
        #[source]
        source: Errno,
    },
    /// The standard streams could not be redirected.
    #[error("failed to redirect standard streams to '{path}': {source}")]
    Redirect {
        /// File the streams were being pointed at.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Waiting for the intermediate child failed.
    #[error("failed to reap intermediate child {pid}: {source}")]
    Reap {
        /// Intermediate child pid.
        pid: u32,
        /// Underlying errno.
        #[source]
        source: Errno,
    },
}

/// Errors raised on the controller's side of the detach sequence.
///
/// Failures inside the detached process never reach the caller; they are
/// written to the daemon log instead.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The log or runtime directory could not be prepared.
    #[error(transparent)]
    Layout(#[from] LayoutError),
    /// The activation mark could not be appended to the log.
    #[error("failed to mark log '{path}': {source}")]
    MarkLog {
        /// Log file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Forking or reaping failed.
    #[error(transparent)]
    Detach(#[from] DetachError),
}
