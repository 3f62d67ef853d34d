//! The notification loop.
//!
//! One thread polls the event channel and the private wake-up socket with no
//! timeout. Event datagrams are drained and dispatched; the wake-up socket
//! carries the shutdown sentinel written by [`Hal::cleanup`].

use std::io::{self, Read};
use std::os::fd::AsFd;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tracing::{debug, error, info, warn};

use crate::hal::{Hal, WAKE_SENTINEL};
use crate::router::EVENTS_TARGET;
use crate::transport::Channel;

const WAKE_BUFFER_SIZE: usize = 64;

/// Why the event loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The shutdown sentinel arrived.
    Shutdown,
    /// The event channel hung up.
    HangUp,
    /// The event channel was already closed.
    Closed,
    /// `poll` failed with something other than `EINTR`.
    PollFailed(Errno),
    /// Another call already ran, or is running, the loop.
    AlreadyRunning,
}

enum WakeOutcome {
    Exit,
    Continue,
}

impl Hal {
    /// Runs the event loop on the calling thread until shutdown or hang-up,
    /// then performs the one-time teardown.
    ///
    /// Calling this while a loop is running, after it finished, or after
    /// [`Hal::cleanup`] tore the engine down inline returns
    /// [`LoopExit::AlreadyRunning`] immediately.
    pub fn run_event_loop(&self) -> LoopExit {
        self.run_event_loop_notifying(|| {})
    }

    /// Like [`Hal::run_event_loop`], but calls `on_started` once this call
    /// owns the loop and before the first poll.
    ///
    /// `on_started` is dropped without being called when the loop was
    /// already claimed.
    pub fn run_event_loop_notifying(&self, on_started: impl FnOnce()) -> LoopExit {
        if self.loop_claimed.swap(true, std::sync::atomic::Ordering::AcqRel) {
            debug!(target: EVENTS_TARGET, "event loop already claimed");
            return LoopExit::AlreadyRunning;
        }
        info!(target: EVENTS_TARGET, "event loop started");
        on_started();
        let exit = self.poll_until_exit();
        info!(target: EVENTS_TARGET, reason = ?exit, "event loop stopped");
        self.finish_teardown();
        exit
    }

    fn poll_until_exit(&self) -> LoopExit {
        let Some(channel) = self.transport().event_channel() else {
            return LoopExit::Closed;
        };
        let mut buffer = vec![0_u8; self.receive_buffer_size()];
        loop {
            let mut fds = [
                PollFd::new(channel.as_fd(), PollFlags::POLLIN),
                PollFd::new(self.wake_rx.as_fd(), PollFlags::POLLIN),
            ];
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(errno) => {
                    error!(target: EVENTS_TARGET, %errno, "poll failed");
                    return LoopExit::PollFailed(errno);
                }
            }
            let [event_fd, wake_fd] = &fds;
            let event_ready = event_fd.revents().unwrap_or_else(PollFlags::empty);
            let wake_ready = wake_fd.revents().unwrap_or_else(PollFlags::empty);

            if event_ready.contains(PollFlags::POLLERR) {
                self.report_socket_error(&channel, &mut buffer);
            } else if event_ready.contains(PollFlags::POLLHUP) {
                warn!(target: EVENTS_TARGET, "event channel hung up");
                return LoopExit::HangUp;
            } else if event_ready.contains(PollFlags::POLLIN) {
                self.drain_events(&channel, &mut buffer);
            }

            if wake_ready.intersects(PollFlags::POLLIN | PollFlags::POLLHUP)
                && matches!(self.read_wake_signal(), WakeOutcome::Exit)
            {
                return LoopExit::Shutdown;
            }
        }
    }

    fn report_socket_error(&self, channel: &Channel, buffer: &mut [u8]) {
        match channel.try_recv(buffer) {
            Ok(Some(received)) => {
                warn!(target: EVENTS_TARGET, received, "event channel flagged an error");
            }
            Ok(None) => warn!(target: EVENTS_TARGET, "event channel flagged an error"),
            Err(error) => warn!(target: EVENTS_TARGET, %error, "event channel error"),
        }
    }

    fn drain_events(&self, channel: &Channel, buffer: &mut [u8]) {
        let router = self.router();
        match channel.receive_all(buffer, |datagram| {
            router.dispatch(datagram);
        }) {
            Ok(count) => debug!(target: EVENTS_TARGET, count, "event datagrams drained"),
            Err(error) => warn!(target: EVENTS_TARGET, %error, "failed to drain event channel"),
        }
    }

    fn read_wake_signal(&self) -> WakeOutcome {
        let mut payload = [0_u8; WAKE_BUFFER_SIZE];
        match (&self.wake_rx).read(&mut payload) {
            Ok(0) => {
                warn!(target: EVENTS_TARGET, "wake-up channel closed");
                WakeOutcome::Exit
            }
            Ok(received) => {
                let bytes = payload.get(..received).unwrap_or_default();
                if bytes.starts_with(WAKE_SENTINEL) {
                    debug!(target: EVENTS_TARGET, "shutdown sentinel received");
                    WakeOutcome::Exit
                } else {
                    warn!(
                        target: EVENTS_TARGET,
                        payload = %String::from_utf8_lossy(bytes),
                        "ignoring unexpected wake-up payload"
                    );
                    WakeOutcome::Continue
                }
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => WakeOutcome::Continue,
            Err(error) => {
                warn!(target: EVENTS_TARGET, %error, "failed to read wake-up channel");
                WakeOutcome::Continue
            }
        }
    }
}
