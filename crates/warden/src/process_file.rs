//! Pid file persistence and liveness classification.
//!
//! The pid file is the single record of which process is the active daemon
//! instance. Only the freshly detached child writes it; any number of
//! controllers read it. Unreadable or malformed content is treated as if the
//! file were absent.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::Builder;
use thiserror::Error;
use tracing::debug;

use crate::process_group::ProcessGroups;

const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process_file");

/// Observable state of a managed daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    /// No pid file exists.
    Stopped,
    /// The pid file names a live process group.
    Running,
    /// The pid file exists but its process group is gone: a crash or a stale
    /// file that warrants inspecting the log.
    Unknown,
}

impl fmt::Display for DaemonState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Unknown => "unknown",
        })
    }
}

/// Errors raised while writing or removing the pid file.
#[derive(Debug, Error)]
pub enum ProcessFileError {
    /// Writing the pid failed.
    #[error("failed to write pid file '{path}': {source}")]
    Store {
        /// Pid file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Removing the pid file failed.
    #[error("failed to remove pid file '{path}': {source}")]
    Clear {
        /// Pid file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Pid file at a fixed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessFile {
    path: PathBuf,
}

impl ProcessFile {
    /// Wraps the pid file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the pid file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Atomically replaces the file content with `pid`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessFileError::Store`] when the write or rename fails.
    pub fn store(&self, pid: u32) -> Result<(), ProcessFileError> {
        atomic_write(&self.path, pid.to_string().as_bytes()).map_err(|source| {
            ProcessFileError::Store {
                path: self.path.clone(),
                source,
            }
        })?;
        debug!(target: PROCESS_TARGET, pid, path = %self.path.display(), "stored pid");
        Ok(())
    }

    /// Reads the recorded pid; missing or unparsable content yields `None`.
    #[must_use]
    pub fn recall(&self) -> Option<u32> {
        let content = fs::read_to_string(&self.path).ok()?;
        content.trim().parse().ok()
    }

    /// Removes the pid file; absence is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessFileError::Clear`] for failures other than the file
    /// already being gone.
    pub fn clear(&self) -> Result<(), ProcessFileError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(target: PROCESS_TARGET, path = %self.path.display(), "cleared pid file");
                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ProcessFileError::Clear {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Whether the recorded pid still belongs to a live process group.
    pub fn running<G: ProcessGroups + ?Sized>(&self, groups: &G) -> bool {
        self.recall()
            .is_some_and(|pid| groups.group_of(pid).is_some())
    }

    /// Classifies the daemon from the pid file and a liveness probe.
    pub fn status<G: ProcessGroups + ?Sized>(&self, groups: &G) -> DaemonState {
        if !self.path.exists() {
            DaemonState::Stopped
        } else if self.running(groups) {
            DaemonState::Running
        } else {
            DaemonState::Unknown
        }
    }

    /// Clears the pid file unless it names a live process.
    ///
    /// # Errors
    ///
    /// Propagates [`ProcessFile::clear`] failures.
    pub fn cleanup<G: ProcessGroups + ?Sized>(&self, groups: &G) -> Result<(), ProcessFileError> {
        if self.running(groups) {
            return Ok(());
        }
        self.clear()
    }
}

/// Writes `contents` to a sibling temporary file, syncs it, then renames it
/// over `path`, so readers see either the old or the new payload in full.
fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let directory = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "pid file path did not have a parent directory",
        )
    })?;

    let mut builder = Builder::new();
    builder.prefix(
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("warden"),
    );
    builder.permissions(fs::Permissions::from_mode(0o644));

    let mut file = builder.tempfile_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}
