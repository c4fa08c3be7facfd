//! Crash reports written to the daemon log.
//!
//! A report is framed by the exception-backtrace sentinel and the crash
//! sentinel so [`crate::log_file::LogFile::crashed`] and the crash tail can
//! find it.

use std::any::Any;
use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::io::{self, Write};
use std::panic::{self, PanicHookInfo};
use std::sync::Mutex;

use crate::sentinel;

use super::error::DaemonError;

/// Panic details captured by the hook, which still sees the location and
/// the original stack.
#[derive(Debug)]
struct PanicRecord {
    message: String,
    location: Option<String>,
    backtrace: String,
}

static LAST_PANIC: Mutex<Option<PanicRecord>> = Mutex::new(None);

/// Replaces the panic hook with one that records the panic for the next
/// crash report instead of printing it.
pub(crate) fn install_panic_hook() {
    panic::set_hook(Box::new(record_panic));
}

fn record_panic(info: &PanicHookInfo<'_>) {
    let record = PanicRecord {
        message: payload_message(info.payload()),
        location: info.location().map(ToString::to_string),
        backtrace: Backtrace::force_capture().to_string(),
    };
    if let Ok(mut slot) = LAST_PANIC.lock() {
        *slot = Some(record);
    }
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

/// Kind, message, causes and backtrace of one failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CrashReport {
    kind: String,
    message: String,
    causes: Vec<String>,
    backtrace: String,
}

impl CrashReport {
    pub(crate) fn from_daemon_error(error: &DaemonError) -> Self {
        Self::from_error(error.kind(), error)
    }

    /// Builds a report for `error`, walking its source chain.
    ///
    /// A cause whose text already ends the message before it is folded into
    /// that message rather than listed again.
    pub(crate) fn from_error(kind: &str, error: &(dyn StdError + 'static)) -> Self {
        let message = error.to_string();
        let mut causes: Vec<String> = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            let text = cause.to_string();
            let shown = causes.last().unwrap_or(&message);
            if !shown.ends_with(&text) {
                causes.push(text);
            }
            source = cause.source();
        }
        Self {
            kind: kind.to_owned(),
            message,
            causes,
            backtrace: Backtrace::force_capture().to_string(),
        }
    }

    /// Builds a report for a caught panic, preferring what the hook saw.
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let recorded = LAST_PANIC.lock().ok().and_then(|mut slot| slot.take());
        let (message, backtrace) = match recorded {
            Some(PanicRecord {
                message,
                location: Some(location),
                backtrace,
            }) => (format!("{message} at {location}"), backtrace),
            Some(PanicRecord {
                message, backtrace, ..
            }) => (message, backtrace),
            None => (
                payload_message(payload),
                Backtrace::force_capture().to_string(),
            ),
        };
        Self {
            kind: "Panic".to_owned(),
            message,
            causes: Vec::new(),
            backtrace,
        }
    }

    /// Writes the framed report.
    pub(crate) fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", sentinel::exception_backtrace())?;
        writeln!(out, "{}: {}", self.kind, self.message)?;
        for cause in &self.causes {
            writeln!(out, "caused by: {cause}")?;
        }
        for line in self.backtrace.lines().filter(|line| !line.trim().is_empty()) {
            writeln!(out, "{line}")?;
        }
        writeln!(out, "{}", sentinel::DAEMON_CRASHED)?;
        out.flush()
    }
}
