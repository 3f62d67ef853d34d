//! The engine instance.
//!
//! [`Hal`] owns the transport, the shared registry/subscription tables and
//! the wake-up pair used to stop the event loop. Everything is instance
//! scoped, so tests can run several engines side by side.

use std::io::Write;
use std::mem;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::{debug, info, warn};

use wifihal_config::Config;

use crate::command::{
    Command, CommandState, EncodeContext, EventKey, RequestId, SharedCommand,
};
use crate::control;
use crate::errors::HalError;
use crate::event::Event;
use crate::netlink::{Control, Messages, Request};
use crate::registry::{CommandRegistry, ENGINE_TARGET, Tables};
use crate::router::EventRouter;
use crate::transport::Transport;

/// Multicast groups joined at start-up.
pub const REQUIRED_GROUPS: [&str; 4] = ["scan", "mlme", "regulatory", "vendor"];

pub(crate) const WAKE_SENTINEL: &[u8] = b"Exit";

type CompletionHandler = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct TeardownState {
    started: bool,
    finished: bool,
    pending: Vec<CompletionHandler>,
}

/// Receives the messages correlated with one request.
pub(crate) trait ReplySink {
    /// Called once the request has been written.
    fn sent(&mut self) {}

    /// Called for each data message carrying the request's sequence number.
    fn reply(&mut self, event: &Event<'_>);
}

struct ResponseSink<'c> {
    command: &'c dyn Command,
    delivered: bool,
}

impl ReplySink for ResponseSink<'_> {
    fn sent(&mut self) {
        let core = self.command.core();
        if let Err(error) = core.transition(CommandState::AwaitingResponse) {
            debug!(target: ENGINE_TARGET, id = core.id(), %error, "state not advanced");
        }
    }

    fn reply(&mut self, event: &Event<'_>) {
        if self.delivered {
            debug!(
                target: ENGINE_TARGET,
                id = self.command.core().id(),
                "ignoring additional reply message"
            );
            return;
        }
        self.delivered = true;
        self.command.handle_response(event);
    }
}

/// Asynchronous netlink command/event engine.
pub struct Hal {
    transport: Transport,
    registry: CommandRegistry,
    router: EventRouter,
    family: OnceLock<u16>,
    max_message_size: usize,
    receive_buffer_size: usize,
    sequence: AtomicU32,
    shutting_down: AtomicBool,
    pub(crate) loop_claimed: AtomicBool,
    wake_tx: UnixStream,
    pub(crate) wake_rx: UnixStream,
    teardown: Mutex<TeardownState>,
}

impl Hal {
    /// Opens the transport, resolves the configured family and joins the
    /// notification groups. The event loop is not started.
    ///
    /// Groups the family does not advertise, or that cannot be joined, are
    /// logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns transport, allocation or family resolution failures. Any
    /// channel opened before the failure is closed.
    pub fn initialize(config: &Config) -> Result<Self, HalError> {
        let transport = Transport::open(config)?;
        let hal = Self::from_transport(transport, config, None)?;
        let family = control::resolve_family(&hal, config.family_name())?;
        hal.set_family(family.id());
        for name in REQUIRED_GROUPS {
            let Some(group) = family.group(name) else {
                warn!(target: ENGINE_TARGET, group = name, "multicast group not advertised");
                continue;
            };
            if let Err(error) = hal.transport.join_group(group) {
                warn!(target: ENGINE_TARGET, group = name, %error, "failed to join multicast group");
            }
        }
        info!(
            target: ENGINE_TARGET,
            family = config.family_name(),
            family_id = family.id(),
            groups = ?hal.transport.joined_groups(),
            "engine initialised"
        );
        Ok(hal)
    }

    /// Builds an engine over an existing transport.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::Allocation`] when the wake-up pair cannot be
    /// created.
    pub fn from_transport(
        transport: Transport,
        config: &Config,
        family: Option<u16>,
    ) -> Result<Self, HalError> {
        let (wake_tx, wake_rx) =
            UnixStream::pair().map_err(|source| HalError::Allocation { source })?;
        let tables = Arc::new(Mutex::new(Tables::default()));
        let resolved = family.map_or_else(OnceLock::new, OnceLock::from);
        Ok(Self {
            transport,
            registry: CommandRegistry::new(Arc::clone(&tables)),
            router: EventRouter::new(tables),
            family: resolved,
            max_message_size: config.max_message_size(),
            receive_buffer_size: config.receive_buffer_size(),
            sequence: AtomicU32::new(1),
            shutting_down: AtomicBool::new(false),
            loop_claimed: AtomicBool::new(false),
            wake_tx,
            wake_rx,
            teardown: Mutex::new(TeardownState::default()),
        })
    }

    /// The transport.
    #[must_use]
    pub const fn transport(&self) -> &Transport {
        &self.transport
    }

    /// The command registry.
    #[must_use]
    pub const fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// The event router.
    #[must_use]
    pub const fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Resolved family id.
    #[must_use]
    pub fn family_id(&self) -> Option<u16> {
        self.family.get().copied()
    }

    pub(crate) fn set_family(&self, id: u16) {
        if self.family.set(id).is_err() {
            debug!(target: ENGINE_TARGET, id, "family id already resolved");
        }
    }

    /// Whether cleanup has begun.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub(crate) const fn receive_buffer_size(&self) -> usize {
        self.receive_buffer_size
    }

    /// Context handed to [`Command::encode`].
    #[must_use]
    pub fn encode_context(&self) -> EncodeContext {
        EncodeContext::new(self.family_id(), self.max_message_size)
    }

    fn next_sequence(&self) -> u32 {
        loop {
            let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            if seq != 0 {
                return seq;
            }
        }
    }

    /// Sends `request` and feeds correlated replies to `sink` until the
    /// request is acknowledged, fails, or a multi-part reply ends.
    ///
    /// The command channel stays locked for the whole exchange, so replies
    /// always reach the thread that sent the request. There is no timeout.
    pub(crate) fn transact(
        &self,
        label: &'static str,
        request: Request,
        sink: &mut dyn ReplySink,
    ) -> Result<(), HalError> {
        if self.is_shutting_down() {
            return Err(HalError::ShuttingDown);
        }
        let seq = self.next_sequence();
        self.transport.with_command_channel(|channel| {
            let bytes = request.finish(seq, channel.port())?;
            channel.send(&bytes)?;
            sink.sent();
            debug!(target: ENGINE_TARGET, command = label, seq, "request sent");

            let mut buffer = vec![0_u8; self.receive_buffer_size];
            loop {
                let received = channel.recv(&mut buffer)?;
                let datagram = buffer.get(..received).unwrap_or_default();
                for parsed in Messages::new(datagram) {
                    let message = match parsed {
                        Ok(message) => message,
                        Err(violation) => {
                            // Nothing further arrives for this request.
                            warn!(
                                target: ENGINE_TARGET,
                                command = label,
                                seq,
                                %violation,
                                "malformed reply; finishing without a response"
                            );
                            return Ok(());
                        }
                    };
                    if message.seq() != seq {
                        warn!(
                            target: ENGINE_TARGET,
                            command = label,
                            expected = seq,
                            received = message.seq(),
                            "skipping reply with unexpected sequence"
                        );
                        continue;
                    }
                    match message.control() {
                        Control::Ack | Control::Done => return Ok(()),
                        Control::Error(code) => {
                            return Err(HalError::Driver {
                                command: label,
                                errno: code.saturating_neg(),
                            });
                        }
                        Control::Noop => {}
                        Control::Data => sink.reply(&Event::new(message)),
                    }
                }
            }
        })
    }

    /// Encodes, sends and blocks for the reply of `command`.
    ///
    /// The reply is handed to [`Command::handle_response`] at most once.
    ///
    /// # Errors
    ///
    /// Returns encoding errors before anything is sent, transport errors,
    /// [`HalError::Driver`] when the driver rejects the request, and
    /// [`HalError::InvalidState`] when the command was already sent.
    pub fn request_response(&self, command: &dyn Command) -> Result<(), HalError> {
        let core = command.core();
        let request = command.encode(&self.encode_context())?;
        core.transition(CommandState::Sent)?;
        let mut sink = ResponseSink {
            command,
            delivered: false,
        };
        let outcome = self.transact(core.label(), request, &mut sink);
        if matches!(outcome, Ok(()) | Err(HalError::Driver { .. })) {
            if let Err(error) = core.transition(CommandState::Completed) {
                debug!(target: ENGINE_TARGET, id = core.id(), %error, "completion not recorded");
            }
        }
        outcome
    }

    /// Registers `command` under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::DuplicateRegistration`] for a taken id and
    /// [`HalError::ShuttingDown`] once cleanup has begun.
    pub fn register_command(&self, id: RequestId, command: SharedCommand) -> Result<(), HalError> {
        if self.is_shutting_down() {
            return Err(HalError::ShuttingDown);
        }
        self.registry.register(id, command)
    }

    /// Removes `id` from the registry, returning the registry's reference.
    pub fn unregister_command(&self, id: RequestId) -> Option<SharedCommand> {
        self.registry.unregister(id)
    }

    /// Subscribes `command` to events matching `key`.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::DuplicateSubscription`] for a taken key.
    pub fn subscribe_event(&self, key: EventKey, command: &SharedCommand) -> Result<(), HalError> {
        self.router.subscribe(key, command)
    }

    /// Removes the subscription for `key`, if any.
    pub fn unsubscribe_event(&self, key: EventKey) -> bool {
        self.router.unsubscribe(key)
    }

    /// Unregisters and cancels the command under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::UnknownCommand`] when nothing is registered under
    /// `id`, or the command's own cancellation error.
    pub fn cancel_command(&self, id: RequestId) -> Result<(), HalError> {
        let command = self
            .registry
            .unregister(id)
            .ok_or(HalError::UnknownCommand { id })?;
        self.cancel_held(&command)
    }

    /// Cancels a command the caller holds. Only the first call per command
    /// reaches [`Command::cancel`].
    ///
    /// # Errors
    ///
    /// Propagates the command's cancellation error.
    pub fn cancel_held(&self, command: &SharedCommand) -> Result<(), HalError> {
        let core = command.core();
        if !core.mark_cancelled() {
            debug!(target: ENGINE_TARGET, id = core.id(), "command already cancelled");
            return Ok(());
        }
        debug!(target: ENGINE_TARGET, id = core.id(), command = core.label(), "cancelling command");
        command.cancel(self)
    }

    /// Starts the two-phase shutdown.
    ///
    /// Phase one runs on the calling thread: every registered command is
    /// cancelled, leftover subscriptions are reported and new work is
    /// refused. Phase two wakes the event loop, which tears down the
    /// transport and then calls `on_done` exactly once. When the loop was
    /// never started the teardown runs here instead.
    ///
    /// Repeated calls each get their own `on_done`, called once teardown
    /// has finished.
    pub fn cleanup(&self, on_done: impl FnOnce() + Send + 'static) {
        info!(target: ENGINE_TARGET, "cleanup requested");
        let cancelled = self.registry.drain_and_cancel_all(|command| {
            if let Err(error) = self.cancel_held(command) {
                warn!(
                    target: ENGINE_TARGET,
                    id = command.core().id(),
                    %error,
                    "command cancellation failed"
                );
            }
        });
        for key in self.router.keys() {
            warn!(target: ENGINE_TARGET, %key, "subscription still registered at cleanup");
        }
        self.shutting_down.store(true, Ordering::Release);
        info!(target: ENGINE_TARGET, cancelled, "commands cancelled");

        self.store_completion(Box::new(on_done));
        if self
            .loop_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            debug!(target: ENGINE_TARGET, "event loop never ran; tearing down inline");
            self.finish_teardown();
        } else {
            self.signal_exit();
        }
    }

    /// Queues `on_done` behind any earlier cleanup request, or runs it at
    /// once when teardown already finished.
    fn store_completion(&self, on_done: CompletionHandler) {
        let run_now = {
            let mut state = self.lock_teardown();
            if state.finished {
                Some(on_done)
            } else {
                state.pending.push(on_done);
                None
            }
        };
        if let Some(handler) = run_now {
            handler();
        }
    }

    fn signal_exit(&self) {
        if let Err(error) = (&self.wake_tx).write_all(WAKE_SENTINEL) {
            warn!(target: ENGINE_TARGET, %error, "failed to wake event loop");
        }
    }

    #[cfg(test)]
    pub(crate) fn wake_with(&self, payload: &[u8]) -> std::io::Result<()> {
        (&self.wake_tx).write_all(payload)
    }

    /// Releases everything left after the event loop stops. Runs once.
    pub(crate) fn finish_teardown(&self) {
        {
            let mut state = self.lock_teardown();
            if state.started {
                return;
            }
            state.started = true;
        }

        self.shutting_down.store(true, Ordering::Release);
        let residual = self.registry.drain_and_cancel_all(|command| {
            if let Err(error) = self.cancel_held(command) {
                warn!(target: ENGINE_TARGET, %error, "residual cancellation failed");
            }
        });
        if residual > 0 {
            warn!(target: ENGINE_TARGET, residual, "commands left at teardown");
        }
        for key in self.router.clear() {
            warn!(target: ENGINE_TARGET, %key, "leaked subscription cleared");
        }
        self.transport.close();

        let handlers = {
            let mut state = self.lock_teardown();
            state.finished = true;
            mem::take(&mut state.pending)
        };
        info!(target: ENGINE_TARGET, completions = handlers.len(), "teardown complete");
        for on_done in handlers {
            on_done();
        }
    }

    /// Whether teardown has completed.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.lock_teardown().finished
    }

    fn lock_teardown(&self) -> MutexGuard<'_, TeardownState> {
        self.teardown.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
