//! Error types for controller operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::daemon::SpawnError;
use crate::process_file::ProcessFileError;
use crate::process_group::SignalError;

/// Errors raised while executing lifecycle commands.
///
/// Conditions the operator should read about, such as a daemon that is not
/// running or survives the kill, are reported as output instead.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Writing operator output failed.
    #[error("failed to write controller output: {0}")]
    Output(#[source] io::Error),
    /// Detaching the daemon failed before it was running.
    #[error("failed to start daemon: {0}")]
    Spawn(#[from] SpawnError),
    /// The pid file could not be cleared.
    #[error(transparent)]
    ProcessFile(#[from] ProcessFileError),
    /// A signal could not be delivered.
    #[error(transparent)]
    Signal(#[from] SignalError),
    /// The log could not be read for the crash dump.
    #[error("failed to read daemon log '{path}': {source}")]
    ReadLog {
        /// Log file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}
