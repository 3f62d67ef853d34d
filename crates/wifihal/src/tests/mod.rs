//! Test suites for the engine.

#![expect(
    clippy::host_endian_bytes,
    reason = "fixtures build host-order netlink frames"
)]

mod support;
