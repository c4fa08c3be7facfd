//! Output format of the structured log.
//!
//! A detached daemon's stderr is its log file, so whatever format is chosen
//! shares that file with the lifecycle sentinel lines.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How `tracing` events are rendered.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, fields flattened.
    Json,
    /// One terse human-readable line per event.
    #[default]
    Compact,
}

impl LogFormat {
    /// Whether ANSI colour codes should be emitted for this format.
    ///
    /// JSON never carries colour; compact output is coloured only on an
    /// interactive terminal, never into a log file.
    #[must_use]
    pub const fn uses_colour(self, writer_is_terminal: bool) -> bool {
        match self {
            Self::Json => false,
            Self::Compact => writer_is_terminal,
        }
    }
}

/// Error returned when text names no [`LogFormat`].
pub type LogFormatParseError = strum::ParseError;
