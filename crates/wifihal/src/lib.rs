//! Asynchronous netlink command and event engine for the wifi HAL.
//!
//! The engine keeps two generic netlink channels open to the wireless
//! driver. The command channel carries synchronous request/response
//! exchanges; the event channel is subscribed to the driver's multicast
//! groups and drained by a single event loop thread.
//!
//! Callers work with [`Command`] implementations. A command encodes its
//! request, decodes its reply and optionally receives notifications routed
//! to it through the [`EventRouter`]. Long-lived commands are owned by the
//! [`CommandRegistry`] under a caller-chosen [`RequestId`] until they are
//! cancelled or the engine is cleaned up.
//!
//! ## Lifetime
//!
//! Commands are shared as `Arc<dyn Command>`. The registry owns one strong
//! reference; the event router only keeps weak links. Dispatch and
//! cancellation clone the `Arc` under the table lock and invoke callbacks
//! after releasing it, so a command is never freed while a callback runs and
//! is dropped exactly once.
//!
//! ## Shutdown
//!
//! [`Hal::cleanup`] cancels every registered command on the calling thread,
//! then wakes the event loop through a private socket pair. The loop releases
//! the transport and calls the completion callback once. See the [`vendor`]
//! module for the operations built on top of the engine.

mod command;
mod control;
mod errors;
mod event;
mod event_loop;
mod hal;
pub mod netlink;
mod registry;
mod router;
pub mod transport;
pub mod vendor;

pub use command::{
    Command, CommandCore, CommandState, EncodeContext, EventKey, RequestId, SharedCommand,
    VendorBinding,
};
pub use control::{FamilyInfo, resolve_family, resolve_group};
pub use errors::{EncodingError, HalError, ProtocolViolation, TransportError};
pub use event::Event;
pub use event_loop::LoopExit;
pub use hal::{Hal, REQUIRED_GROUPS};
pub use registry::CommandRegistry;
pub use router::EventRouter;
pub use transport::{Channel, Transport};

#[cfg(test)]
mod tests;
