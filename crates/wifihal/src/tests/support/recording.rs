//! Commands that record what the engine does to them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use crate::command::{Command, CommandCore, EncodeContext, EventKey, RequestId};
use crate::errors::{EncodingError, HalError};
use crate::event::Event;
use crate::hal::Hal;
use crate::netlink::Request;

/// Counters shared between a test and its commands.
#[derive(Debug, Default)]
pub struct Counters {
    pub responses: AtomicUsize,
    pub events: AtomicUsize,
    pub cancels: AtomicUsize,
    pub drops: AtomicUsize,
}

impl Counters {
    pub fn responses(&self) -> usize {
        self.responses.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> usize {
        self.events.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }
}

type CancelHook = Box<dyn FnOnce(&Hal) + Send>;

/// Parks `handle_event` until the test releases it.
pub struct Gate {
    entered: Sender<()>,
    release: Mutex<Receiver<()>>,
}

impl Gate {
    pub fn new(entered: Sender<()>, release: Receiver<()>) -> Self {
        Self {
            entered,
            release: Mutex::new(release),
        }
    }
}

/// Command that counts callbacks and drops.
pub struct RecordingCommand {
    core: CommandCore,
    counters: Arc<Counters>,
    payloads: Mutex<Vec<Vec<u8>>>,
    unsubscribe_on_cancel: Option<EventKey>,
    on_cancel: Mutex<Option<CancelHook>>,
    gate: Option<Gate>,
}

impl RecordingCommand {
    pub fn new(id: RequestId, counters: &Arc<Counters>) -> Self {
        Self {
            core: CommandCore::new(id, "recording"),
            counters: Arc::clone(counters),
            payloads: Mutex::new(Vec::new()),
            unsubscribe_on_cancel: None,
            on_cancel: Mutex::new(None),
            gate: None,
        }
    }

    /// Drops the subscription for `key` when cancelled.
    pub fn unsubscribing(mut self, key: EventKey) -> Self {
        self.unsubscribe_on_cancel = Some(key);
        self
    }

    /// Runs `hook` against the engine when cancelled.
    pub fn on_cancel(self, hook: impl FnOnce(&Hal) + Send + 'static) -> Self {
        *self.on_cancel.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
        self
    }

    /// Blocks event handling on `gate`.
    pub fn gated(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Vendor payloads seen by `handle_event`.
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Command for RecordingCommand {
    fn core(&self) -> &CommandCore {
        &self.core
    }

    fn encode(&self, ctx: &EncodeContext) -> Result<Request, EncodingError> {
        let mut request = ctx.request(1, 0)?;
        request.put_u32(1, 0xC0FF_EE00)?;
        Ok(request)
    }

    fn handle_response(&self, _reply: &Event<'_>) {
        self.counters.responses.fetch_add(1, Ordering::SeqCst);
    }

    fn handle_event(&self, event: &Event<'_>) {
        if let Some(gate) = &self.gate {
            let _ = gate.entered.send(());
            let _ = gate
                .release
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .recv();
        }
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.vendor_data().unwrap_or_default().to_vec());
        self.counters.events.fetch_add(1, Ordering::SeqCst);
    }

    fn cancel(&self, hal: &Hal) -> Result<(), HalError> {
        self.counters.cancels.fetch_add(1, Ordering::SeqCst);
        if let Some(key) = self.unsubscribe_on_cancel {
            hal.unsubscribe_event(key);
        }
        let hook = self
            .on_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(hook) = hook {
            hook(hal);
        }
        Ok(())
    }
}

impl Drop for RecordingCommand {
    fn drop(&mut self) {
        self.counters.drops.fetch_add(1, Ordering::SeqCst);
    }
}
