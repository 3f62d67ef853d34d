use std::fmt;

use tracing::debug;

use super::{NLA_F_NESTED, NLA_HDRLEN, NLA_TYPE_MASK, align, read_u16, read_u32, read_u64};
use crate::errors::ProtocolViolation;

const ATTR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::netlink");

/// A single attribute borrowed from a received message.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Attr<'a> {
    kind: u16,
    nested: bool,
    payload: &'a [u8],
}

impl<'a> Attr<'a> {
    /// Attribute type with flag bits removed.
    #[must_use]
    pub const fn kind(&self) -> u16 {
        self.kind
    }

    /// Whether the sender flagged the attribute as nested.
    #[must_use]
    pub const fn is_nested(&self) -> bool {
        self.nested
    }

    /// Raw payload without header or padding.
    #[must_use]
    pub const fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Payload length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// First payload byte.
    #[must_use]
    pub fn as_u8(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    /// Payload as a host-order `u16`.
    #[must_use]
    pub fn as_u16(&self) -> Option<u16> {
        read_u16(self.payload, 0)
    }

    /// Payload as a host-order `u32`.
    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        read_u32(self.payload, 0)
    }

    /// Payload as a host-order `u64`.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        read_u64(self.payload, 0)
    }

    /// Payload as UTF-8 with the trailing NUL terminators removed.
    #[must_use]
    pub fn as_str(&self) -> Option<&'a str> {
        let end = self
            .payload
            .iter()
            .position(|byte| *byte == 0)
            .unwrap_or(self.payload.len());
        std::str::from_utf8(self.payload.get(..end)?).ok()
    }

    /// Iterates the payload as a run of attributes.
    #[must_use]
    pub const fn nested(&self) -> Attributes<'a> {
        Attributes::new(self.payload)
    }
}

impl fmt::Debug for Attr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attr")
            .field("kind", &self.kind)
            .field("nested", &self.nested)
            .field("len", &self.payload.len())
            .finish()
    }
}

/// Iterator over a run of attributes.
///
/// Iteration stops at the first malformed header; the violation is logged at
/// debug level because short trailing padding is common on the wire.
#[derive(Debug, Clone)]
pub struct Attributes<'a> {
    remaining: &'a [u8],
}

impl<'a> Attributes<'a> {
    /// Iterates attributes stored in `bytes`.
    #[must_use]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { remaining: bytes }
    }

    /// An iterator that yields nothing.
    #[must_use]
    pub const fn empty() -> Self {
        Self { remaining: &[] }
    }

    /// Returns the first attribute of type `kind`.
    #[must_use]
    pub fn lookup(mut self, kind: u16) -> Option<Attr<'a>> {
        self.find(|attr| attr.kind() == kind)
    }

    fn parse_next(&mut self) -> Result<Option<Attr<'a>>, ProtocolViolation> {
        if self.remaining.len() < NLA_HDRLEN {
            return Ok(None);
        }
        let (Some(length), Some(raw_kind)) =
            (read_u16(self.remaining, 0), read_u16(self.remaining, 2))
        else {
            return Ok(None);
        };
        let length = usize::from(length);
        if length < NLA_HDRLEN || length > self.remaining.len() {
            return Err(ProtocolViolation::BadLength {
                what: "attribute",
                length,
            });
        }
        let payload = self
            .remaining
            .get(NLA_HDRLEN..length)
            .ok_or(ProtocolViolation::BadLength {
                what: "attribute",
                length,
            })?;
        let advance = align(length).min(self.remaining.len());
        self.remaining = self.remaining.get(advance..).unwrap_or_default();
        Ok(Some(Attr {
            kind: raw_kind & NLA_TYPE_MASK,
            nested: raw_kind & NLA_F_NESTED != 0,
            payload,
        }))
    }
}

impl<'a> Iterator for Attributes<'a> {
    type Item = Attr<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.parse_next() {
            Ok(attr) => attr,
            Err(violation) => {
                debug!(target: ATTR_TARGET, %violation, "stopping attribute iteration");
                self.remaining = &[];
                None
            }
        }
    }
}
