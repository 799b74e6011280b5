//! Output formats accepted by the `log_format` setting.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How the supervisor renders its own log events.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, flattened for log shippers.
    #[default]
    Json,
    /// Single-line human-readable output for terminals.
    Compact,
}

impl LogFormat {
    /// Returns `true` when events are emitted as JSON objects.
    #[must_use]
    pub const fn is_structured(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Error returned when a log format string is not recognised.
pub type LogFormatParseError = strum::ParseError;
