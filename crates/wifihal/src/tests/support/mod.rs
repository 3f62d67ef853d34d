//! Test harness utilities for the engine suites.

mod driver;
mod recording;
mod world;

pub use driver::{
    FAMILY, FakeDriver, Harness, Responder, ack, acknowledge_all, done, nack, plain_message,
    seq_of, vendor_message, vendor_payload,
};
pub use recording::{Counters, Gate, RecordingCommand};
pub use world::{TestWorld, world};

use std::time::{Duration, Instant};

/// How long tests wait for asynchronous effects.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Polls `condition` until it holds or [`WAIT_TIMEOUT`] elapses.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
