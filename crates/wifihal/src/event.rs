//! Read-only view over a received reply or notification.

use crate::command::{EventKey, VendorBinding};
use crate::errors::ProtocolViolation;
use crate::netlink::{Attr, Attributes, MessageView, NlHeader, nl80211};

/// A parsed message handed to [`crate::Command::handle_response`] and
/// [`crate::Command::handle_event`].
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    message: MessageView<'a>,
}

impl<'a> Event<'a> {
    pub(crate) const fn new(message: MessageView<'a>) -> Self {
        Self { message }
    }

    /// Parses the first message of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolViolation`] for a malformed header.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ProtocolViolation> {
        MessageView::parse(bytes).map(|(message, _)| Self::new(message))
    }

    /// Netlink header of the message.
    #[must_use]
    pub const fn header(&self) -> &NlHeader {
        self.message.header()
    }

    /// Generic netlink command.
    #[must_use]
    pub fn cmd(&self) -> Option<u8> {
        self.message.genl_cmd()
    }

    /// Top-level attributes.
    #[must_use]
    pub fn attributes(&self) -> Attributes<'a> {
        self.message.attributes()
    }

    /// First top-level attribute of type `kind`.
    #[must_use]
    pub fn attribute(&self, kind: u16) -> Option<Attr<'a>> {
        self.attributes().lookup(kind)
    }

    /// Top-level `u32` attribute.
    #[must_use]
    pub fn get_u32(&self, kind: u16) -> Option<u32> {
        self.attribute(kind).and_then(|attr| attr.as_u32())
    }

    /// Vendor OUI of a vendor message.
    #[must_use]
    pub fn vendor_id(&self) -> Option<u32> {
        self.get_u32(nl80211::ATTR_VENDOR_ID)
    }

    /// Vendor subcommand of a vendor message.
    #[must_use]
    pub fn vendor_subcmd(&self) -> Option<u32> {
        self.get_u32(nl80211::ATTR_VENDOR_SUBCMD)
    }

    /// Vendor id and subcommand, when both are present.
    #[must_use]
    pub fn vendor_binding(&self) -> Option<VendorBinding> {
        Some(VendorBinding::new(self.vendor_id()?, self.vendor_subcmd()?))
    }

    /// Routing key of the message. Vendor messages without a complete binding
    /// have no key.
    #[must_use]
    pub fn key(&self) -> Option<EventKey> {
        let code = self.cmd()?;
        if code == nl80211::CMD_VENDOR {
            let binding = self.vendor_binding()?;
            return Some(EventKey::vendor(binding.vendor_id, binding.subcmd));
        }
        Some(EventKey::new(code))
    }

    /// Vendor payload. An absent or zero-length block is reported as `None`.
    #[must_use]
    pub fn vendor_data(&self) -> Option<&'a [u8]> {
        self.attribute(nl80211::ATTR_VENDOR_DATA)
            .map(|attr| attr.payload())
            .filter(|payload| !payload.is_empty())
    }

    /// Vendor payload parsed as attributes; empty when there is no payload.
    #[must_use]
    pub fn vendor_attributes(&self) -> Attributes<'a> {
        self.vendor_data()
            .map_or_else(Attributes::empty, Attributes::new)
    }
}
