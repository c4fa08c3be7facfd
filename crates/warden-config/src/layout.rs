//! Derives the on-disk layout shared by a daemon and its controller.
//!
//! A daemon named `echo` rooted at `/srv/echo` writes its combined output to
//! `/srv/echo/log/echo.log` and its pid to `/srv/echo/run/echo.pid`. The
//! working directory is made absolute when the layout is built, before any
//! fork, so a detached child that changes directory never re-resolves a
//! relative path against the wrong base.

use std::fs;
use std::io;
use std::path::{self, Path, PathBuf};

use thiserror::Error;

use crate::Config;

const LOG_DIRECTORY: &str = "log";
const RUNTIME_DIRECTORY: &str = "run";

/// Immutable per-instance paths for one managed daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSpec {
    name: String,
    working_directory: PathBuf,
    log_directory: PathBuf,
    log_file_path: PathBuf,
    runtime_directory: PathBuf,
    process_file_path: PathBuf,
}

impl DaemonSpec {
    /// Builds the layout for `name` rooted at `working_directory`.
    ///
    /// The name is normalised with [`daemon_name`] and the directory is
    /// resolved against the current directory exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::Resolve`] when the directory cannot be made
    /// absolute (for example, an empty path).
    pub fn new(name: &str, working_directory: impl AsRef<Path>) -> Result<Self, LayoutError> {
        let requested = working_directory.as_ref();
        let working_directory =
            path::absolute(requested).map_err(|source| LayoutError::Resolve {
                path: requested.to_path_buf(),
                source,
            })?;
        let name = daemon_name(name);
        let log_directory = working_directory.join(LOG_DIRECTORY);
        let runtime_directory = working_directory.join(RUNTIME_DIRECTORY);
        Ok(Self {
            log_file_path: log_directory.join(format!("{name}.log")),
            process_file_path: runtime_directory.join(format!("{name}.pid")),
            name,
            working_directory,
            log_directory,
            runtime_directory,
        })
    }

    /// Builds the layout for `name` using the configured working directory.
    ///
    /// # Errors
    ///
    /// Propagates [`DaemonSpec::new`] failures.
    pub fn from_config(name: &str, config: &Config) -> Result<Self, LayoutError> {
        Self::new(name, config.working_directory().as_std_path())
    }

    /// Creates the log and runtime directories when absent.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::CreateDirectory`] naming the directory that
    /// could not be created.
    pub fn prepare_directories(&self) -> Result<(), LayoutError> {
        for directory in [&self.log_directory, &self.runtime_directory] {
            fs::create_dir_all(directory).map_err(|source| LayoutError::CreateDirectory {
                path: directory.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Normalised daemon name used for file names and the process title.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute directory the detached daemon runs in.
    #[must_use]
    pub fn working_directory(&self) -> &Path {
        self.working_directory.as_path()
    }

    /// Directory holding the daemon log.
    #[must_use]
    pub fn log_directory(&self) -> &Path {
        self.log_directory.as_path()
    }

    /// Append-only log receiving the daemon's stdout and stderr.
    #[must_use]
    pub fn log_file_path(&self) -> &Path {
        self.log_file_path.as_path()
    }

    /// Directory holding runtime artefacts.
    #[must_use]
    pub fn runtime_directory(&self) -> &Path {
        self.runtime_directory.as_path()
    }

    /// Path to the pid file.
    #[must_use]
    pub fn process_file_path(&self) -> &Path {
        self.process_file_path.as_path()
    }
}

/// Normalises a raw identifier into a file-name-safe daemon name.
///
/// Each run of characters outside `[A-Za-z0-9]` collapses into a single
/// `-`, so `my_app::EchoDaemon` becomes `my-app-EchoDaemon`.
#[must_use]
pub fn daemon_name(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    let mut in_separator = false;
    for character in raw.chars() {
        if character.is_ascii_alphanumeric() {
            name.push(character);
            in_separator = false;
        } else if !in_separator {
            name.push('-');
            in_separator = true;
        }
    }
    name
}

/// Errors raised while deriving or preparing the daemon layout.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// The working directory could not be made absolute.
    #[error("failed to resolve working directory '{path}': {source}")]
    Resolve {
        /// Directory as requested.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A log or runtime directory could not be created.
    #[error("failed to create directory '{path}': {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}
