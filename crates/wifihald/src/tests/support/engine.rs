//! Engine opener backed by local socket pairs instead of the kernel.

use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::net::{UnixDatagram, UnixStream};
use std::sync::{Mutex, PoisonError};

use wifihal::{Channel, Hal, HalError, Transport};
use wifihal_config::Config;

const FAMILY: u16 = 0x1c;
const COMMAND_PORT: u32 = 0x0A00_0001;
const EVENT_PORT: u32 = 0x0A40_0001;

/// How the fake event channel behaves once the engine is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventChannel {
    /// Stays quiet until cleanup.
    Quiet,
    /// The peer is closed immediately, so the loop sees a hang-up.
    HungUp,
}

/// Opens engines over socket pairs and keeps the peer ends alive.
#[derive(Debug)]
pub struct FakeHalOpener {
    events: EventChannel,
    fails: bool,
    peers: Mutex<Vec<OwnedFd>>,
}

impl FakeHalOpener {
    pub fn new(events: EventChannel) -> Self {
        Self {
            events,
            fails: false,
            peers: Mutex::new(Vec::new()),
        }
    }

    /// Opener that reports the configured family as missing.
    pub fn failing() -> Self {
        Self {
            fails: true,
            ..Self::new(EventChannel::Quiet)
        }
    }

    fn keep(&self, peer: impl Into<OwnedFd>) {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(peer.into());
    }

    fn event_channel(&self) -> io::Result<Channel> {
        match self.events {
            EventChannel::Quiet => {
                let (local, peer) = UnixDatagram::pair()?;
                self.keep(peer);
                Ok(Channel::from_fd(local, EVENT_PORT))
            }
            EventChannel::HungUp => {
                let (local, peer) = UnixStream::pair()?;
                drop(peer);
                Ok(Channel::from_fd(local, EVENT_PORT))
            }
        }
    }
}

impl crate::bootstrap::HalOpener for FakeHalOpener {
    fn open(&self, config: &Config) -> Result<Hal, HalError> {
        if self.fails {
            return Err(HalError::UnknownFamily {
                name: config.family_name().to_owned(),
            });
        }
        let (command, peer) =
            UnixDatagram::pair().map_err(|source| HalError::Allocation { source })?;
        self.keep(peer);
        let event = self
            .event_channel()
            .map_err(|source| HalError::Allocation { source })?;
        let transport =
            Transport::from_channels(Channel::from_fd(command, COMMAND_PORT), event);
        Hal::from_transport(transport, config, Some(FAMILY))
    }
}
