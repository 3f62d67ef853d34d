//! Scripted stand-in for the kernel side of both channels.

use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::net::{UnixDatagram, UnixStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use wifihal_config::Config;

use crate::errors::EncodingError;
use crate::event::Event;
use crate::hal::Hal;
use crate::netlink::{NLMSG_DONE, NLMSG_ERROR, NlHeader, Request};
use crate::transport::{Channel, Transport};
use crate::vendor::with_vendor_data;

/// Family id the fake driver answers to.
pub const FAMILY: u16 = 0x1c;

const COMMAND_PORT: u32 = 0x0A00_0001;
const EVENT_PORT: u32 = 0x0A40_0001;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Produces the datagrams sent back for one request.
pub type Responder = Box<dyn FnMut(&Event<'_>) -> Vec<Vec<u8>> + Send>;

/// Acknowledgement for the request with sequence `seq`.
pub fn ack(seq: u32) -> Vec<u8> {
    error_message(seq, 0)
}

/// Error reply carrying `-errno` for the request with sequence `seq`.
pub fn nack(seq: u32, errno: i32) -> Vec<u8> {
    error_message(seq, -errno)
}

/// End-of-dump marker.
pub fn done(seq: u32) -> Vec<u8> {
    NlHeader {
        length: 20,
        kind: NLMSG_DONE,
        flags: 0,
        seq,
        port: 0,
    }
    .to_bytes()
    .iter()
    .copied()
    .chain(0_i32.to_ne_bytes())
    .collect()
}

fn error_message(seq: u32, code: i32) -> Vec<u8> {
    let echoed = NlHeader {
        length: 20,
        kind: FAMILY,
        flags: 0,
        seq,
        port: COMMAND_PORT,
    }
    .to_bytes();
    let header = NlHeader {
        length: 36,
        kind: NLMSG_ERROR,
        flags: 0,
        seq,
        port: 0,
    }
    .to_bytes();
    let mut bytes = header.to_vec();
    bytes.extend_from_slice(&code.to_ne_bytes());
    bytes.extend_from_slice(&echoed);
    bytes
}

/// Vendor message addressed to `oui`/`subcmd` whose vendor data is written
/// by `write`.
pub fn vendor_message(
    seq: u32,
    oui: u32,
    subcmd: u32,
    write: impl FnOnce(&mut Request) -> Result<(), EncodingError>,
) -> Vec<u8> {
    let mut request = Request::vendor(FAMILY, oui, subcmd, None, 4096).expect("vendor header");
    with_vendor_data(&mut request, write).expect("vendor data");
    request.finish(seq, 0).expect("finish")
}

/// Vendor message whose vendor data is the raw `payload`.
pub fn vendor_payload(seq: u32, oui: u32, subcmd: u32, payload: &[u8]) -> Vec<u8> {
    let mut request = Request::vendor(FAMILY, oui, subcmd, None, 4096).expect("vendor header");
    request
        .put_bytes(crate::netlink::nl80211::ATTR_VENDOR_DATA, payload)
        .expect("vendor data");
    request.finish(seq, 0).expect("finish")
}

/// Non-vendor notification carrying generic command `cmd`.
pub fn plain_message(seq: u32, cmd: u8) -> Vec<u8> {
    Request::new(FAMILY, cmd, 0, 4096)
        .finish(seq, 0)
        .expect("finish")
}

/// Sequence number of a parsed request.
pub fn seq_of(request: &Event<'_>) -> u32 {
    request.header().seq
}

/// Responder acknowledging every request.
pub fn acknowledge_all() -> Responder {
    Box::new(|request| vec![ack(seq_of(request))])
}

/// Kernel side of the command channel, served by a background thread.
pub struct FakeDriver {
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
    responder: Arc<Mutex<Responder>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FakeDriver {
    fn spawn(socket: UnixDatagram) -> io::Result<Self> {
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        let requests = Arc::new(Mutex::new(Vec::new()));
        let responder: Arc<Mutex<Responder>> = Arc::new(Mutex::new(acknowledge_all()));
        let stop = Arc::new(AtomicBool::new(false));
        let handle = thread::Builder::new().name("fake-driver".to_owned()).spawn({
            let requests = Arc::clone(&requests);
            let responder = Arc::clone(&responder);
            let stop = Arc::clone(&stop);
            move || serve(&socket, &requests, &responder, &stop)
        })?;
        Ok(Self {
            requests,
            responder,
            stop,
            handle: Some(handle),
        })
    }

    /// Replaces the responder used for subsequent requests.
    pub fn respond_with(&self, responder: Responder) {
        *self.responder.lock().unwrap_or_else(PoisonError::into_inner) = responder;
    }

    /// Raw requests received so far.
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for FakeDriver {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn serve(
    socket: &UnixDatagram,
    requests: &Mutex<Vec<Vec<u8>>>,
    responder: &Mutex<Responder>,
    stop: &AtomicBool,
) {
    let mut buffer = vec![0_u8; 8192];
    while !stop.load(Ordering::Acquire) {
        let received = match socket.recv(&mut buffer) {
            Ok(received) => received,
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                continue;
            }
            Err(_) => return,
        };
        let bytes = buffer.get(..received).unwrap_or_default().to_vec();
        let replies = match Event::parse(&bytes) {
            Ok(request) => {
                let mut respond = responder.lock().unwrap_or_else(PoisonError::into_inner);
                (*respond)(&request)
            }
            Err(_) => Vec::new(),
        };
        requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(bytes);
        for reply in replies {
            if socket.send(&reply).is_err() {
                return;
            }
        }
    }
}

/// Engine wired to a fake driver over socket pairs.
pub struct Harness {
    /// Engine under test.
    pub hal: Arc<Hal>,
    /// Command channel peer.
    pub driver: FakeDriver,
    events: Option<UnixDatagram>,
    stream_peer: Option<UnixStream>,
}

impl Harness {
    /// Datagram event channel, family already resolved.
    pub fn new() -> Self {
        let (command_local, command_remote) = UnixDatagram::pair().expect("command pair");
        let (event_local, event_remote) = UnixDatagram::pair().expect("event pair");
        Self::assemble(
            command_local,
            OwnedFd::from(event_local),
            command_remote,
            Some(event_remote),
            None,
        )
    }

    /// Stream event channel whose peer can hang up.
    pub fn with_stream_events() -> Self {
        let (command_local, command_remote) = UnixDatagram::pair().expect("command pair");
        let (event_local, event_remote) = UnixStream::pair().expect("event pair");
        Self::assemble(
            command_local,
            OwnedFd::from(event_local),
            command_remote,
            None,
            Some(event_remote),
        )
    }

    fn assemble(
        command_local: UnixDatagram,
        event_local: OwnedFd,
        command_remote: UnixDatagram,
        events: Option<UnixDatagram>,
        stream_peer: Option<UnixStream>,
    ) -> Self {
        let transport = Transport::from_channels(
            Channel::from_fd(command_local, COMMAND_PORT),
            Channel::from_fd(event_local, EVENT_PORT),
        );
        let hal = Hal::from_transport(transport, &Config::default(), Some(FAMILY))
            .expect("engine");
        Self {
            hal: Arc::new(hal),
            driver: FakeDriver::spawn(command_remote).expect("driver"),
            events,
            stream_peer,
        }
    }

    /// Sends `datagram` on the event channel.
    pub fn emit(&self, datagram: &[u8]) {
        self.events
            .as_ref()
            .expect("datagram event channel")
            .send(datagram)
            .expect("emit event");
    }

    /// Closes the peer of a stream event channel.
    pub fn hang_up(&mut self) {
        drop(self.stream_peer.take());
    }

    /// Starts the event loop on its own thread and waits until it owns the
    /// loop.
    pub fn spawn_loop(&self) -> JoinHandle<crate::LoopExit> {
        let hal = Arc::clone(&self.hal);
        let handle = thread::Builder::new()
            .name("wifihal-events".to_owned())
            .spawn(move || hal.run_event_loop())
            .expect("spawn event loop");
        assert!(
            super::wait_until(|| self.hal.loop_claimed.load(Ordering::Acquire)),
            "event loop did not start"
        );
        handle
    }
}
