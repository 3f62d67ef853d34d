//! Ownership of the command and event channels.
//!
//! The command channel carries synchronous request/response traffic and is
//! serialised by its own mutex so a reply is always read by the thread that
//! sent the matching request. The event channel only receives multicast
//! notifications and is shared with the event loop through an `Arc`.

mod channel;
mod ports;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use wifihal_config::Config;

pub use channel::Channel;
pub use ports::{PortAllocator, port_for};

use crate::errors::{HalError, TransportError};

pub(crate) const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// The pair of channels owned by one engine instance.
#[derive(Debug)]
pub struct Transport {
    command: Mutex<Option<Channel>>,
    event: Mutex<Option<Arc<Channel>>>,
    groups: Mutex<Vec<u32>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Transport {
    /// Opens both channels on ports derived from the process id.
    ///
    /// A channel opened before a later failure is closed when it drops.
    ///
    /// # Errors
    ///
    /// Returns the first [`TransportError`] raised while opening, binding or
    /// connecting either socket.
    pub fn open(config: &Config) -> Result<Self, TransportError> {
        let mut ports = PortAllocator::for_current_process();
        let command = ports.bind_with(config.command_port_slot(), Channel::netlink)?;
        let event = ports.bind_with(config.event_port_slot(), Channel::netlink)?;
        info!(
            target: TRANSPORT_TARGET,
            command_port = command.port(),
            event_port = event.port(),
            "netlink channels opened"
        );
        Ok(Self::from_channels(command, event))
    }

    /// Builds a transport from already connected channels.
    #[must_use]
    pub fn from_channels(command: Channel, event: Channel) -> Self {
        Self {
            command: Mutex::new(Some(command)),
            event: Mutex::new(Some(Arc::new(event))),
            groups: Mutex::new(Vec::new()),
        }
    }

    /// Runs `operation` with exclusive use of the command channel.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] after [`Transport::close`], or any
    /// error produced by `operation`.
    pub(crate) fn with_command_channel<R>(
        &self,
        operation: impl FnOnce(&Channel) -> Result<R, HalError>,
    ) -> Result<R, HalError> {
        let guard = lock(&self.command);
        let channel = guard.as_ref().ok_or(TransportError::Closed)?;
        operation(channel)
    }

    /// Shared handle to the event channel, if still open.
    #[must_use]
    pub fn event_channel(&self) -> Option<Arc<Channel>> {
        lock(&self.event).clone()
    }

    /// Joins multicast `group` on the event channel.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] after close or the kernel's refusal.
    pub fn join_group(&self, group: u32) -> Result<(), TransportError> {
        let channel = self.event_channel().ok_or(TransportError::Closed)?;
        channel.add_membership(group)?;
        lock(&self.groups).push(group);
        debug!(target: TRANSPORT_TARGET, group, "joined multicast group");
        Ok(())
    }

    /// Groups joined so far.
    #[must_use]
    pub fn joined_groups(&self) -> Vec<u32> {
        lock(&self.groups).clone()
    }

    /// Drains the event channel, handing every datagram to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] after close, or the first receive
    /// error.
    pub fn receive_all(
        &self,
        buffer: &mut [u8],
        sink: impl FnMut(&[u8]),
    ) -> Result<usize, TransportError> {
        let channel = self.event_channel().ok_or(TransportError::Closed)?;
        channel.receive_all(buffer, sink)
    }

    /// Whether [`Transport::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        lock(&self.command).is_none() && lock(&self.event).is_none()
    }

    /// Closes both channels. The event socket stays open until the last
    /// outstanding `Arc` from [`Transport::event_channel`] is dropped.
    pub fn close(&self) {
        let command = lock(&self.command).take();
        let event = lock(&self.event).take();
        lock(&self.groups).clear();
        if command.is_some() || event.is_some() {
            info!(target: TRANSPORT_TARGET, "netlink channels closed");
        }
    }
}
