//! A single connected netlink socket.

use std::io;
use std::mem;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

use nix::errno::Errno;
use nix::sys::socket::{
    AddressFamily, MsgFlags, NetlinkAddr, SockFlag, SockProtocol, SockType, bind, connect, recv,
    send, socket,
};

use crate::errors::TransportError;

/// One duplex channel identified by its local port.
#[derive(Debug)]
pub struct Channel {
    fd: OwnedFd,
    port: u32,
}

impl Channel {
    /// Opens a generic netlink socket bound to `port` and connected to the
    /// kernel.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Bind`] when the port is taken so callers can
    /// retry with another port.
    pub fn netlink(port: u32) -> Result<Self, TransportError> {
        let fd = socket(
            AddressFamily::Netlink,
            SockType::Raw,
            SockFlag::SOCK_CLOEXEC,
            SockProtocol::NetlinkGeneric,
        )
        .map_err(|errno| TransportError::Open {
            source: io::Error::from(errno),
        })?;
        bind(fd.as_raw_fd(), &NetlinkAddr::new(port, 0)).map_err(|errno| TransportError::Bind {
            port,
            source: io::Error::from(errno),
        })?;
        connect(fd.as_raw_fd(), &NetlinkAddr::new(0, 0)).map_err(|errno| {
            TransportError::Connect {
                source: io::Error::from(errno),
            }
        })?;
        Ok(Self { fd, port })
    }

    /// Wraps an already connected descriptor, e.g. one end of a socket pair.
    pub fn from_fd(fd: impl Into<OwnedFd>, port: u32) -> Self {
        Self {
            fd: fd.into(),
            port,
        }
    }

    /// Local port stamped into outgoing headers.
    #[must_use]
    pub const fn port(&self) -> u32 {
        self.port
    }

    /// Writes one encoded message.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Send`] on OS failure or a short write.
    pub fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        loop {
            match send(self.fd.as_raw_fd(), bytes, MsgFlags::empty()) {
                Ok(written) if written == bytes.len() => return Ok(()),
                Ok(written) => {
                    return Err(TransportError::Send {
                        source: io::Error::new(
                            io::ErrorKind::WriteZero,
                            format!("short write: {written} of {} bytes", bytes.len()),
                        ),
                    });
                }
                Err(Errno::EINTR) => {}
                Err(errno) => {
                    return Err(TransportError::Send {
                        source: io::Error::from(errno),
                    });
                }
            }
        }
    }

    /// Blocks until one datagram arrives.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] when the peer has gone away and
    /// [`TransportError::Receive`] on other OS failures.
    pub fn recv(&self, buffer: &mut [u8]) -> Result<usize, TransportError> {
        loop {
            match recv(self.fd.as_raw_fd(), buffer, MsgFlags::empty()) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(received) => return Ok(received),
                Err(Errno::EINTR) => {}
                Err(errno) => {
                    return Err(TransportError::Receive {
                        source: io::Error::from(errno),
                    });
                }
            }
        }
    }

    /// Reads one datagram if one is queued.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Receive`] for anything other than an empty
    /// queue, including a pending socket error.
    pub fn try_recv(&self, buffer: &mut [u8]) -> Result<Option<usize>, TransportError> {
        loop {
            match recv(self.fd.as_raw_fd(), buffer, MsgFlags::MSG_DONTWAIT) {
                Ok(0) => return Ok(None),
                Ok(received) => return Ok(Some(received)),
                Err(Errno::EINTR) => {}
                Err(Errno::EAGAIN) => return Ok(None),
                Err(errno) => {
                    return Err(TransportError::Receive {
                        source: io::Error::from(errno),
                    });
                }
            }
        }
    }

    /// Drains every queued datagram, handing each to `sink`.
    ///
    /// Returns the number of datagrams delivered.
    ///
    /// # Errors
    ///
    /// Stops at the first receive error and returns it.
    pub fn receive_all(
        &self,
        buffer: &mut [u8],
        mut sink: impl FnMut(&[u8]),
    ) -> Result<usize, TransportError> {
        let mut delivered = 0;
        while let Some(received) = self.try_recv(buffer)? {
            sink(buffer.get(..received).unwrap_or_default());
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Subscribes the socket to a multicast group.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Membership`] when the kernel refuses.
    pub fn add_membership(&self, group: u32) -> Result<(), TransportError> {
        let length = libc::socklen_t::try_from(mem::size_of::<u32>()).unwrap_or(4);
        // SAFETY: the option value points at a live u32 of the advertised size.
        let status = unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                libc::SOL_NETLINK,
                libc::NETLINK_ADD_MEMBERSHIP,
                std::ptr::from_ref(&group).cast::<libc::c_void>(),
                length,
            )
        };
        if status < 0 {
            return Err(TransportError::Membership {
                group,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

impl AsFd for Channel {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}
