//! Local port allocation.
//!
//! A port packs the low 22 bits of the process id with a 10 bit slot so that
//! several sockets of one process, and several co-located processes, rarely
//! collide. Collisions that do happen surface as `EADDRINUSE` on bind and move
//! the allocator to the next free slot.

use std::io;

use tracing::debug;

use crate::errors::TransportError;

const PORTS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

const PID_MASK: u32 = 0x003F_FFFF;
const SLOT_SHIFT: u32 = 22;
const SLOT_MASK: u32 = (1 << 10) - 1;
const MAX_BIND_ATTEMPTS: u32 = 16;

/// Computes the port for `pid` in `slot`.
#[must_use]
pub const fn port_for(pid: u32, slot: u32) -> u32 {
    (pid & PID_MASK) | ((slot & SLOT_MASK) << SLOT_SHIFT)
}

/// Hands out distinct slots for the sockets of one engine instance.
#[derive(Debug)]
pub struct PortAllocator {
    pid: u32,
    taken: Vec<u32>,
}

impl PortAllocator {
    /// Builds an allocator seeded from `pid`.
    #[must_use]
    pub const fn new(pid: u32) -> Self {
        Self {
            pid,
            taken: Vec::new(),
        }
    }

    /// Builds an allocator seeded from the current process id.
    #[must_use]
    pub fn for_current_process() -> Self {
        Self::new(std::process::id())
    }

    /// Slots successfully handed out so far.
    #[must_use]
    pub fn taken(&self) -> &[u32] {
        &self.taken
    }

    /// Calls `bind` with ports derived from `preferred_slot` onwards until one
    /// is accepted.
    ///
    /// # Errors
    ///
    /// Propagates any error other than an in-use port, or reports
    /// [`TransportError::PortsExhausted`] after the attempt budget.
    pub fn bind_with<T>(
        &mut self,
        preferred_slot: u32,
        mut bind: impl FnMut(u32) -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        let mut slot = preferred_slot & SLOT_MASK;
        for _ in 0..MAX_BIND_ATTEMPTS {
            if self.taken.contains(&slot) {
                slot = (slot + 1) & SLOT_MASK;
                continue;
            }
            let port = port_for(self.pid, slot);
            match bind(port) {
                Ok(bound) => {
                    self.taken.push(slot);
                    return Ok(bound);
                }
                Err(TransportError::Bind { source, .. })
                    if source.kind() == io::ErrorKind::AddrInUse =>
                {
                    debug!(target: PORTS_TARGET, port, slot, "port in use, trying next slot");
                    slot = (slot + 1) & SLOT_MASK;
                }
                Err(error) => return Err(error),
            }
        }
        Err(TransportError::PortsExhausted {
            attempts: MAX_BIND_ATTEMPTS,
        })
    }
}
