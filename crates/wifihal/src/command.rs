//! Commands and the state they carry through the engine.
//!
//! A command is shared as [`SharedCommand`], an `Arc<dyn Command>`. The
//! registry owns one strong reference per registered id; dispatch and
//! cancellation take temporary clones while the table lock is released. The
//! command is dropped exactly once, when the last of those references goes.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use strum::Display;

use crate::errors::{EncodingError, HalError};
use crate::event::Event;
use crate::hal::Hal;
use crate::netlink::{Request, nl80211};

/// Caller-chosen identifier of an outstanding command. Zero is used for
/// one-shot operations.
pub type RequestId = i32;

/// Shared ownership handle for a command.
pub type SharedCommand = Arc<dyn Command>;

/// Vendor OUI and subcommand identifying a vendor-scoped message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VendorBinding {
    /// Vendor OUI.
    pub vendor_id: u32,
    /// Vendor subcommand or event number.
    pub subcmd: u32,
}

impl VendorBinding {
    /// Builds a binding.
    #[must_use]
    pub const fn new(vendor_id: u32, subcmd: u32) -> Self {
        Self { vendor_id, subcmd }
    }
}

/// Full key a subscription is registered and matched under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey {
    /// Generic netlink command of the notification.
    pub code: u8,
    /// Vendor binding; present exactly when `code` is the vendor command.
    pub vendor: Option<VendorBinding>,
}

impl EventKey {
    /// Key for a non-vendor notification.
    #[must_use]
    pub const fn new(code: u8) -> Self {
        Self { code, vendor: None }
    }

    /// Key for a vendor notification.
    #[must_use]
    pub const fn vendor(vendor_id: u32, subcmd: u32) -> Self {
        Self {
            code: nl80211::CMD_VENDOR,
            vendor: Some(VendorBinding::new(vendor_id, subcmd)),
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.vendor {
            Some(binding) => write!(
                f,
                "cmd {}/vendor {:#08x}/subcmd {:#x}",
                self.code, binding.vendor_id, binding.subcmd
            ),
            None => write!(f, "cmd {}", self.code),
        }
    }
}

/// Lifecycle of a command.
///
/// `Created -> Sent -> AwaitingResponse -> Completed`, with `Cancelled`
/// reachable from every other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CommandState {
    /// Built but not yet transmitted.
    Created,
    /// Written to the command channel.
    Sent,
    /// Waiting for the correlated reply.
    AwaitingResponse,
    /// Reply received.
    Completed,
    /// Cancelled by the caller or by cleanup.
    Cancelled,
}

impl CommandState {
    const fn allows(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Sent)
                | (Self::Sent, Self::AwaitingResponse)
                | (Self::AwaitingResponse, Self::Completed)
                | (
                    Self::Created | Self::Sent | Self::AwaitingResponse | Self::Completed,
                    Self::Cancelled
                )
        )
    }
}

/// State shared by every command implementation.
#[derive(Debug)]
pub struct CommandCore {
    id: RequestId,
    label: &'static str,
    binding: Option<VendorBinding>,
    state: Mutex<CommandState>,
}

impl CommandCore {
    /// Builds a core for a command in the `Created` state.
    #[must_use]
    pub const fn new(id: RequestId, label: &'static str) -> Self {
        Self {
            id,
            label,
            binding: None,
            state: Mutex::new(CommandState::Created),
        }
    }

    /// Attaches the vendor binding used to match events.
    #[must_use]
    pub fn with_binding(mut self, binding: VendorBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Request id.
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// Short name used in logs and errors.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.label
    }

    /// Vendor binding, if any.
    #[must_use]
    pub const fn binding(&self) -> Option<VendorBinding> {
        self.binding
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CommandState {
        *self.lock_state()
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::InvalidState`] for a transition outside the
    /// lifecycle.
    pub fn transition(&self, next: CommandState) -> Result<(), HalError> {
        let mut state = self.lock_state();
        if !state.allows(next) {
            return Err(HalError::InvalidState {
                command: self.label,
                from: *state,
                to: next,
            });
        }
        *state = next;
        Ok(())
    }

    /// Marks the command cancelled. Returns `true` only for the call that
    /// performed the transition.
    pub fn mark_cancelled(&self) -> bool {
        let mut state = self.lock_state();
        if *state == CommandState::Cancelled {
            return false;
        }
        *state = CommandState::Cancelled;
        true
    }

    /// Whether the command has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state() == CommandState::Cancelled
    }

    fn lock_state(&self) -> MutexGuard<'_, CommandState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Parameters a command needs to encode its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeContext {
    family: Option<u16>,
    limit: usize,
}

impl EncodeContext {
    /// Builds a context for `family` with a message size `limit`.
    #[must_use]
    pub const fn new(family: Option<u16>, limit: usize) -> Self {
        Self { family, limit }
    }

    /// Resolved family id.
    ///
    /// # Errors
    ///
    /// Returns [`EncodingError::UnresolvedFamily`] before family resolution.
    pub fn family(&self) -> Result<u16, EncodingError> {
        self.family.ok_or(EncodingError::UnresolvedFamily)
    }

    /// Maximum encoded size.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Starts a request for the resolved family.
    ///
    /// # Errors
    ///
    /// Fails before family resolution.
    pub fn request(&self, cmd: u8, flags: u16) -> Result<Request, EncodingError> {
        Ok(Request::new(self.family()?, cmd, flags, self.limit))
    }

    /// Starts a vendor request for the resolved family.
    ///
    /// # Errors
    ///
    /// Fails before family resolution or when the headers overflow.
    pub fn vendor_request(
        &self,
        binding: VendorBinding,
        ifindex: Option<u32>,
    ) -> Result<Request, EncodingError> {
        Request::vendor(
            self.family()?,
            binding.vendor_id,
            binding.subcmd,
            ifindex,
            self.limit,
        )
    }
}

/// A unit of work driven by the engine.
///
/// Implementations decide what goes on the wire and how replies and events
/// are decoded; the engine owns sending, correlation, state transitions and
/// lifetime.
pub trait Command: Send + Sync {
    /// Identity and lifecycle state.
    fn core(&self) -> &CommandCore;

    /// Builds the request. Must not perform I/O.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodingError`] for values the wire cannot carry.
    fn encode(&self, ctx: &EncodeContext) -> Result<Request, EncodingError>;

    /// Decodes the reply to a request. Called at most once per request.
    fn handle_response(&self, _reply: &Event<'_>) {}

    /// Receives a notification routed by a subscription. Must not block.
    fn handle_event(&self, _event: &Event<'_>) {}

    /// Releases external state such as subscriptions. Invoked at most once,
    /// by [`Hal::cancel_command`] or cleanup.
    ///
    /// # Errors
    ///
    /// Implementations that issue a stop request may report its failure.
    fn cancel(&self, _hal: &Hal) -> Result<(), HalError> {
        Ok(())
    }
}
