//! Log output selection for the daemon.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// `tracing` targets emitted by the engine, one per subsystem.
pub const ENGINE_LOG_TARGETS: [&str; 4] = [
    "wifihal::engine",
    "wifihal::events",
    "wifihal::transport",
    "wifihal::vendor",
];

/// How the daemon writes log records to stderr.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per record, for the platform log collector.
    #[default]
    Json,
    /// Single-line text for a developer shell.
    Compact,
}

impl LogFormat {
    /// Whether records are machine-readable.
    #[must_use]
    pub const fn is_structured(self) -> bool {
        matches!(self, Self::Json)
    }

    /// Colour is only emitted for text records written to a terminal.
    #[must_use]
    pub const fn uses_ansi(self, stderr_is_terminal: bool) -> bool {
        stderr_is_terminal && !self.is_structured()
    }
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Appends a `debug` directive for every engine target to `base`.
///
/// Used when an operator asks for verbose engine logs without restating the
/// rest of the filter.
#[must_use]
pub fn with_engine_debug(base: &str) -> String {
    ENGINE_LOG_TARGETS
        .iter()
        .fold(base.trim_end_matches(',').to_owned(), |mut filter, target| {
            if !filter.is_empty() {
                filter.push(',');
            }
            filter.push_str(target);
            filter.push_str("=debug");
            filter
        })
}
