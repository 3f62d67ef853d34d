//! Error taxonomy of the engine.
//!
//! Only [`TransportError`] and allocation failures raised by
//! [`crate::Hal::initialize`] abort the whole instance. Every other failure is
//! returned on the path of the command that caused it and leaves the registry
//! and subscription tables untouched.

use std::io;

use thiserror::Error;

use crate::command::{CommandState, EventKey, RequestId};

/// Failures of the netlink channels.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Creating the socket failed.
    #[error("failed to open netlink socket: {source}")]
    Open {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Binding a local port failed.
    #[error("failed to bind netlink port {port}: {source}")]
    Bind {
        /// Port that could not be bound.
        port: u32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Every candidate port slot was already taken.
    #[error("no free netlink port after {attempts} attempts")]
    PortsExhausted {
        /// Number of slots tried.
        attempts: u32,
    },
    /// Connecting the socket to the kernel failed.
    #[error("failed to connect netlink socket: {source}")]
    Connect {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Writing a request failed.
    #[error("failed to send netlink message: {source}")]
    Send {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Reading from a channel failed.
    #[error("failed to receive netlink message: {source}")]
    Receive {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Joining a multicast group failed.
    #[error("failed to join multicast group {group}: {source}")]
    Membership {
        /// Numeric group id.
        group: u32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// The channel has been closed by teardown or by the peer.
    #[error("netlink channel is closed")]
    Closed,
}

/// Failures while building a request. Scoped to the command being encoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// The request would exceed the configured message size.
    #[error("request exceeds the {limit} byte message limit")]
    Overflow {
        /// Configured limit in bytes.
        limit: usize,
    },
    /// An attribute value cannot be represented on the wire.
    #[error("invalid value for attribute {attribute}: {reason}")]
    InvalidValue {
        /// Attribute type being written.
        attribute: u16,
        /// Human readable reason.
        reason: &'static str,
    },
    /// A nested attribute was closed out of order or left open.
    #[error("unbalanced nested attribute")]
    UnbalancedNest,
    /// The message family id has not been resolved yet.
    #[error("generic netlink family is not resolved")]
    UnresolvedFamily,
}

/// Malformed input observed on the wire. Logged and skipped, never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// Fewer bytes were available than a header requires.
    #[error("truncated {what}: need {needed} bytes, have {available}")]
    Truncated {
        /// Structure being parsed.
        what: &'static str,
        /// Bytes required.
        needed: usize,
        /// Bytes present.
        available: usize,
    },
    /// A length field is smaller than its own header or larger than the
    /// remaining buffer.
    #[error("invalid {what} length {length}")]
    BadLength {
        /// Structure being parsed.
        what: &'static str,
        /// Length claimed by the header.
        length: usize,
    },
}

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum HalError {
    /// Internal resources such as the wake-up channel could not be created.
    #[error("failed to allocate engine resources: {source}")]
    Allocation {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// A channel operation failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A request could not be encoded.
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    /// The request id is already registered.
    #[error("request id {id} is already registered")]
    DuplicateRegistration {
        /// Conflicting id.
        id: RequestId,
    },
    /// An identical subscription already exists.
    #[error("event subscription {key} already exists")]
    DuplicateSubscription {
        /// Conflicting key.
        key: EventKey,
    },
    /// No command is registered under the id.
    #[error("no command registered under request id {id}")]
    UnknownCommand {
        /// Requested id.
        id: RequestId,
    },
    /// The control family does not know the requested family.
    #[error("generic netlink family {name:?} is not available")]
    UnknownFamily {
        /// Requested family name.
        name: String,
    },
    /// The family does not advertise the requested multicast group.
    #[error("multicast group {group:?} is not advertised by {family:?}")]
    UnknownGroup {
        /// Family that was queried.
        family: String,
        /// Requested group name.
        group: String,
    },
    /// The driver rejected the request with a negative errno.
    #[error("{command} rejected by driver: {}", describe_errno(.errno))]
    Driver {
        /// Label of the rejected command.
        command: &'static str,
        /// Positive errno value reported by the driver.
        errno: i32,
    },
    /// The command cannot move to the requested state.
    #[error("{command} cannot move from {from} to {to}")]
    InvalidState {
        /// Label of the command.
        command: &'static str,
        /// Current state.
        from: CommandState,
        /// Requested state.
        to: CommandState,
    },
    /// The request is outside what the driver supports.
    #[error("operation not supported: {reason}")]
    NotSupported {
        /// Human readable reason.
        reason: &'static str,
    },
    /// Cleanup has started; new work is refused.
    #[error("engine is shutting down")]
    ShuttingDown,
}

fn describe_errno(errno: &i32) -> io::Error {
    io::Error::from_raw_os_error(*errno)
}

impl HalError {
    /// Returns the driver errno when the failure came from a driver reply.
    #[must_use]
    pub const fn driver_errno(&self) -> Option<i32> {
        match self {
            Self::Driver { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}
