//! Scenario world shared by the behavioural suites.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

use crate::command::{EventKey, RequestId, SharedCommand};
use crate::errors::HalError;
use crate::event_loop::LoopExit;

use super::{
    Counters, Harness, RecordingCommand, Responder, ack, nack, seq_of, vendor_payload, wait_until,
};

/// State threaded through BDD steps.
pub struct TestWorld {
    harness: Harness,
    pub counters: Arc<Counters>,
    loop_handle: Option<JoinHandle<LoopExit>>,
    loop_exit: Option<LoopExit>,
    completions: Arc<AtomicUsize>,
    outcome: Option<Result<(), HalError>>,
    registered: Vec<RequestId>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            harness: Harness::new(),
            counters: Arc::new(Counters::default()),
            loop_handle: None,
            loop_exit: None,
            completions: Arc::new(AtomicUsize::new(0)),
            outcome: None,
            registered: Vec::new(),
        }
    }

    pub fn start_loop(&mut self) {
        if self.loop_handle.is_none() {
            self.loop_handle = Some(self.harness.spawn_loop());
        }
    }

    pub fn respond_with(&self, responder: Responder) {
        self.harness.driver.respond_with(responder);
    }

    pub fn reject_with(&self, errno: i32) {
        self.respond_with(Box::new(move |request| vec![nack(seq_of(request), errno)]));
    }

    pub fn reply_with_stale_sequence_first(&self) {
        self.respond_with(Box::new(|request| {
            let seq = seq_of(request);
            vec![
                vendor_payload(seq.wrapping_add(100), 1, 1, &[9]),
                vendor_payload(seq, 1, 1, &[1]),
                ack(seq),
            ]
        }));
    }

    pub fn register_recording(&mut self, count: usize) {
        let first = RequestId::try_from(self.registered.len()).unwrap_or_default() + 1;
        for offset in 0..count {
            let id = first + RequestId::try_from(offset).unwrap_or_default();
            let command: SharedCommand = Arc::new(RecordingCommand::new(id, &self.counters));
            self.harness
                .hal
                .register_command(id, command)
                .expect("register recording command");
            self.registered.push(id);
        }
    }

    pub fn subscribe(&mut self, vendor_id: u32, subcmd: u32) {
        let id = 100;
        let command: SharedCommand = Arc::new(RecordingCommand::new(id, &self.counters));
        let key = EventKey::vendor(vendor_id, subcmd);
        self.harness
            .hal
            .register_command(id, Arc::clone(&command))
            .expect("register subscriber");
        self.harness
            .hal
            .subscribe_event(key, &command)
            .expect("subscribe");
        self.registered.push(id);
    }

    pub fn emit_vendor_event(&self, vendor_id: u32, subcmd: u32) {
        self.harness
            .emit(&vendor_payload(0, vendor_id, subcmd, &[0xAB, 0xCD]));
    }

    /// Emits a marker event on a spare key and waits until the loop has
    /// processed everything queued before it.
    pub fn settle(&self) {
        let marker_counters = Arc::new(Counters::default());
        let marker: SharedCommand = Arc::new(RecordingCommand::new(999, &marker_counters));
        let key = EventKey::vendor(0xFFFF, 0xFFFF);
        self.harness
            .hal
            .subscribe_event(key, &marker)
            .expect("marker subscription");
        self.emit_vendor_event(0xFFFF, 0xFFFF);
        assert!(
            wait_until(|| marker_counters.events() == 1),
            "event loop did not drain the event channel"
        );
        self.harness.hal.unsubscribe_event(key);
    }

    pub fn send_recording(&mut self) {
        let command = RecordingCommand::new(0, &self.counters);
        self.outcome = Some(self.harness.hal.request_response(&command));
    }

    pub fn outcome(&self) -> Option<&Result<(), HalError>> {
        self.outcome.as_ref()
    }

    pub fn cleanup(&mut self) {
        let completions = Arc::clone(&self.completions);
        self.harness.hal.cleanup(move || {
            completions.fetch_add(1, Ordering::SeqCst);
        });
        if let Some(handle) = self.loop_handle.take() {
            self.loop_exit = Some(handle.join().expect("event loop thread"));
        }
    }

    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    pub const fn loop_exit(&self) -> Option<LoopExit> {
        self.loop_exit
    }

    pub fn registered_count(&self) -> usize {
        self.harness.hal.registry().len()
    }

    pub fn registered_ids(&self) -> &[RequestId] {
        &self.registered
    }

    pub fn is_torn_down(&self) -> bool {
        self.harness.hal.is_torn_down()
    }
}

impl Drop for TestWorld {
    fn drop(&mut self) {
        if self.loop_handle.is_some() {
            self.cleanup();
        }
    }
}

/// Fixture used by scenario functions.
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
