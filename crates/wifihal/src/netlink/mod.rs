//! Generic netlink framing.
//!
//! Every message is a 16 byte `nlmsghdr` followed, for generic families, by a
//! 4 byte `genlmsghdr` and a run of 4-byte aligned type-length-value
//! attributes. All integers are in host byte order.

#![expect(clippy::host_endian_bytes, reason = "netlink framing is host byte order")]

mod attr;
mod message;

pub use attr::{Attr, Attributes};
pub use message::{Control, MessageView, Messages, NestToken, NlHeader, Request};

/// Size of the netlink message header.
pub const NLMSG_HDRLEN: usize = 16;
/// Size of the generic netlink header.
pub const GENL_HDRLEN: usize = 4;
/// Size of an attribute header.
pub const NLA_HDRLEN: usize = 4;

/// No-op control message.
pub const NLMSG_NOOP: u16 = 1;
/// Error or acknowledgement control message.
pub const NLMSG_ERROR: u16 = 2;
/// End of a multi-part dump.
pub const NLMSG_DONE: u16 = 3;
/// First message type usable by families.
pub const NLMSG_MIN_TYPE: u16 = 0x10;

/// Request flag.
pub const NLM_F_REQUEST: u16 = 0x1;
/// Part of a multi-part reply.
pub const NLM_F_MULTI: u16 = 0x2;
/// Ask the kernel for an acknowledgement.
pub const NLM_F_ACK: u16 = 0x4;
/// Dump request.
pub const NLM_F_DUMP: u16 = 0x300;

/// Nested attribute marker.
pub const NLA_F_NESTED: u16 = 0x8000;
/// Mask stripping the nested and byte-order flags from an attribute type.
pub const NLA_TYPE_MASK: u16 = 0x3fff;

/// Fixed id of the generic netlink control family.
pub const GENL_ID_CTRL: u16 = 0x10;
/// Control family: resolve a family by name.
pub const CTRL_CMD_GETFAMILY: u8 = 3;
/// Control attribute: numeric family id.
pub const CTRL_ATTR_FAMILY_ID: u16 = 1;
/// Control attribute: family name.
pub const CTRL_ATTR_FAMILY_NAME: u16 = 2;
/// Control attribute: nested list of multicast groups.
pub const CTRL_ATTR_MCAST_GROUPS: u16 = 7;
/// Multicast group entry: group name.
pub const CTRL_ATTR_MCAST_GRP_NAME: u16 = 1;
/// Multicast group entry: group id.
pub const CTRL_ATTR_MCAST_GRP_ID: u16 = 2;

/// nl80211 command and attribute numbers used by the engine.
pub mod nl80211 {
    /// Vendor-scoped command or notification.
    pub const CMD_VENDOR: u8 = 103;
    /// Interface index attribute.
    pub const ATTR_IFINDEX: u16 = 3;
    /// Vendor OUI attribute.
    pub const ATTR_VENDOR_ID: u16 = 195;
    /// Vendor subcommand attribute.
    pub const ATTR_VENDOR_SUBCMD: u16 = 196;
    /// Nested vendor payload attribute.
    pub const ATTR_VENDOR_DATA: u16 = 197;
}

/// Rounds `len` up to the 4 byte netlink alignment.
#[must_use]
pub const fn align(len: usize) -> usize {
    (len + 3) & !3
}

fn read_array<const N: usize>(bytes: &[u8], at: usize) -> Option<[u8; N]> {
    bytes.get(at..at.checked_add(N)?)?.try_into().ok()
}

pub(crate) fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    read_array(bytes, at).map(u16::from_ne_bytes)
}

pub(crate) fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    read_array(bytes, at).map(u32::from_ne_bytes)
}

pub(crate) fn read_i32(bytes: &[u8], at: usize) -> Option<i32> {
    read_array(bytes, at).map(i32::from_ne_bytes)
}

pub(crate) fn read_u64(bytes: &[u8], at: usize) -> Option<u64> {
    read_array(bytes, at).map(u64::from_ne_bytes)
}
