//! Shared configuration for the wifi HAL engine and daemon.
//!
//! Values are layered by `ortho_config`: built-in defaults, then an optional
//! configuration file, then `WIFIHAL_*` environment variables, and finally
//! command-line flags. [`Config::default`] returns the built-in values without
//! consulting any external source, which keeps tests deterministic.

mod defaults;
mod logging;

use std::borrow::Cow;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_COMMAND_PORT_SLOT, DEFAULT_EVENT_PORT_SLOT, DEFAULT_FAMILY_NAME, DEFAULT_LOG_FILTER,
    DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_RECEIVE_BUFFER_SIZE, MAX_PORT_SLOT, MIN_MESSAGE_SIZE,
    default_family_name, default_log_filter, default_log_format,
};
pub use logging::{ENGINE_LOG_TARGETS, LogFormat, LogFormatParseError, with_engine_debug};

/// Resolved runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "WIFIHAL")]
pub struct Config {
    /// `tracing` filter expression, e.g. `info,wifihal::events=debug`.
    #[serde(default = "defaults::default_log_filter")]
    pub log_filter: String,
    /// Output format of the log stream.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
    /// Raises every engine target to `debug` on top of `log_filter`.
    #[serde(default)]
    pub debug_engine: bool,
    /// Generic netlink family resolved at start-up.
    #[serde(default = "defaults::default_family_name")]
    pub family_name: String,
    /// Preferred port slot of the command channel.
    #[serde(default = "defaults::default_command_port_slot")]
    pub command_port_slot: u32,
    /// Preferred port slot of the event channel.
    #[serde(default = "defaults::default_event_port_slot")]
    pub event_port_slot: u32,
    /// Encode limit for a single request.
    #[serde(default = "defaults::default_max_message_size")]
    pub max_message_size: usize,
    /// Receive buffer size for both channels.
    #[serde(default = "defaults::default_receive_buffer_size")]
    pub receive_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: defaults::default_log_filter(),
            log_format: defaults::default_log_format(),
            debug_engine: false,
            family_name: defaults::default_family_name(),
            command_port_slot: defaults::default_command_port_slot(),
            event_port_slot: defaults::default_event_port_slot(),
            max_message_size: defaults::default_max_message_size(),
            receive_buffer_size: defaults::default_receive_buffer_size(),
        }
    }
}

/// Inconsistent values detected by [`Config::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    /// A port slot does not fit in the top ten bits of a netlink port.
    #[error("port slot {slot} exceeds the maximum of {MAX_PORT_SLOT}")]
    PortSlotOutOfRange {
        /// Offending slot.
        slot: u32,
    },
    /// Both channels were configured with the same slot.
    #[error("command and event channels share port slot {slot}")]
    PortSlotConflict {
        /// Shared slot.
        slot: u32,
    },
    /// The request limit cannot hold the protocol headers.
    #[error("max_message_size {size} is below the {MIN_MESSAGE_SIZE} byte header size")]
    MessageSizeTooSmall {
        /// Configured size.
        size: usize,
    },
    /// The receive buffer cannot hold a single header.
    #[error("receive_buffer_size {size} is below the {MIN_MESSAGE_SIZE} byte header size")]
    ReceiveBufferTooSmall {
        /// Configured size.
        size: usize,
    },
}

impl Config {
    /// Returns the configured log filter.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Filter handed to the subscriber, including the engine overrides
    /// when `debug_engine` is set.
    #[must_use]
    pub fn effective_log_filter(&self) -> Cow<'_, str> {
        if self.debug_engine {
            Cow::Owned(with_engine_debug(&self.log_filter))
        } else {
            Cow::Borrowed(&self.log_filter)
        }
    }

    /// Returns the configured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the generic netlink family name.
    #[must_use]
    pub fn family_name(&self) -> &str {
        &self.family_name
    }

    /// Returns the preferred command channel port slot.
    #[must_use]
    pub const fn command_port_slot(&self) -> u32 {
        self.command_port_slot
    }

    /// Returns the preferred event channel port slot.
    #[must_use]
    pub const fn event_port_slot(&self) -> u32 {
        self.event_port_slot
    }

    /// Returns the encode limit for a single request.
    #[must_use]
    pub const fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Returns the receive buffer size.
    #[must_use]
    pub const fn receive_buffer_size(&self) -> usize {
        self.receive_buffer_size
    }

    /// Checks cross-field consistency that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        for slot in [self.command_port_slot, self.event_port_slot] {
            if slot > MAX_PORT_SLOT {
                return Err(ConfigValidationError::PortSlotOutOfRange { slot });
            }
        }
        if self.command_port_slot == self.event_port_slot {
            return Err(ConfigValidationError::PortSlotConflict {
                slot: self.command_port_slot,
            });
        }
        if self.max_message_size < MIN_MESSAGE_SIZE {
            return Err(ConfigValidationError::MessageSizeTooSmall {
                size: self.max_message_size,
            });
        }
        if self.receive_buffer_size < MIN_MESSAGE_SIZE {
            return Err(ConfigValidationError::ReceiveBufferTooSmall {
                size: self.receive_buffer_size,
            });
        }
        Ok(())
    }
}
