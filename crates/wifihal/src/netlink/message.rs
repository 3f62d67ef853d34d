use super::attr::Attributes;
use super::{
    GENL_HDRLEN, NLA_F_NESTED, NLA_HDRLEN, NLM_F_ACK, NLM_F_REQUEST, NLMSG_DONE, NLMSG_ERROR,
    NLMSG_HDRLEN, NLMSG_NOOP, align, nl80211, read_i32, read_u16, read_u32,
};
use crate::errors::{EncodingError, ProtocolViolation};

/// Decoded netlink message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NlHeader {
    /// Total message length including this header.
    pub length: u32,
    /// Message type: a control type or a family id.
    pub kind: u16,
    /// `NLM_F_*` flags.
    pub flags: u16,
    /// Sequence number used for reply correlation.
    pub seq: u32,
    /// Sender port id.
    pub port: u32,
}

impl NlHeader {
    fn parse(bytes: &[u8]) -> Result<Self, ProtocolViolation> {
        let truncated = ProtocolViolation::Truncated {
            what: "netlink header",
            needed: NLMSG_HDRLEN,
            available: bytes.len(),
        };
        Ok(Self {
            length: read_u32(bytes, 0).ok_or(truncated)?,
            kind: read_u16(bytes, 4).ok_or(truncated)?,
            flags: read_u16(bytes, 6).ok_or(truncated)?,
            seq: read_u32(bytes, 8).ok_or(truncated)?,
            port: read_u32(bytes, 12).ok_or(truncated)?,
        })
    }

    /// Serialises the header in host byte order.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; NLMSG_HDRLEN] {
        let mut bytes = [0_u8; NLMSG_HDRLEN];
        let fields: [&[u8]; 5] = [
            &self.length.to_ne_bytes(),
            &self.kind.to_ne_bytes(),
            &self.flags.to_ne_bytes(),
            &self.seq.to_ne_bytes(),
            &self.port.to_ne_bytes(),
        ];
        let mut offset = 0;
        for field in fields {
            if let Some(slot) = bytes.get_mut(offset..offset + field.len()) {
                slot.copy_from_slice(field);
            }
            offset += field.len();
        }
        bytes
    }
}

/// Classification of a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Error message with code zero.
    Ack,
    /// Error message carrying a negative errno.
    Error(i32),
    /// End of a multi-part reply.
    Done,
    /// No-op message.
    Noop,
    /// Family payload.
    Data,
}

/// Borrowed view of one message inside a datagram.
#[derive(Debug, Clone, Copy)]
pub struct MessageView<'a> {
    header: NlHeader,
    body: &'a [u8],
}

impl<'a> MessageView<'a> {
    /// Parses the first message of `bytes` and returns it with the unread rest.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolViolation`] when the header is truncated or claims
    /// an impossible length.
    pub fn parse(bytes: &'a [u8]) -> Result<(Self, &'a [u8]), ProtocolViolation> {
        let header = NlHeader::parse(bytes)?;
        let length = usize::try_from(header.length).unwrap_or(usize::MAX);
        if length < NLMSG_HDRLEN || length > bytes.len() {
            return Err(ProtocolViolation::BadLength {
                what: "netlink message",
                length,
            });
        }
        let body = bytes.get(NLMSG_HDRLEN..length).unwrap_or_default();
        let rest = bytes.get(align(length).min(bytes.len())..).unwrap_or_default();
        Ok((Self { header, body }, rest))
    }

    /// Decoded header.
    #[must_use]
    pub const fn header(&self) -> &NlHeader {
        &self.header
    }

    /// Sequence number of the message.
    #[must_use]
    pub const fn seq(&self) -> u32 {
        self.header.seq
    }

    /// Classifies the message by type.
    #[must_use]
    pub fn control(&self) -> Control {
        match self.header.kind {
            NLMSG_NOOP => Control::Noop,
            NLMSG_DONE => Control::Done,
            NLMSG_ERROR => match read_i32(self.body, 0) {
                Some(0) => Control::Ack,
                Some(code) => Control::Error(code),
                None => Control::Error(-libc::EPROTO),
            },
            _ => Control::Data,
        }
    }

    /// Generic netlink command, absent for control messages.
    #[must_use]
    pub fn genl_cmd(&self) -> Option<u8> {
        match self.control() {
            Control::Data => self.body.first().copied(),
            _ => None,
        }
    }

    /// Attributes following the generic netlink header.
    #[must_use]
    pub fn attributes(&self) -> Attributes<'a> {
        match self.control() {
            Control::Data => Attributes::new(self.body.get(GENL_HDRLEN..).unwrap_or_default()),
            _ => Attributes::empty(),
        }
    }
}

/// Iterator over the messages packed into one datagram.
#[derive(Debug, Clone)]
pub struct Messages<'a> {
    remaining: &'a [u8],
}

impl<'a> Messages<'a> {
    /// Iterates messages stored in `datagram`.
    #[must_use]
    pub const fn new(datagram: &'a [u8]) -> Self {
        Self {
            remaining: datagram,
        }
    }
}

impl<'a> Iterator for Messages<'a> {
    type Item = Result<MessageView<'a>, ProtocolViolation>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }
        match MessageView::parse(self.remaining) {
            Ok((message, rest)) => {
                self.remaining = rest;
                Some(Ok(message))
            }
            Err(violation) => {
                self.remaining = &[];
                Some(Err(violation))
            }
        }
    }
}

/// Opaque marker returned by [`Request::nest_start`].
#[derive(Debug)]
#[must_use = "nested attributes must be closed with Request::nest_end"]
pub struct NestToken {
    offset: usize,
}

/// Builder for an outgoing generic netlink request.
///
/// The netlink header is reserved on construction and completed by
/// [`Request::finish`] once the sequence number and port are known.
#[derive(Debug, Clone)]
pub struct Request {
    buffer: Vec<u8>,
    limit: usize,
    family: u16,
    flags: u16,
    cmd: u8,
    open_nests: usize,
}

impl Request {
    /// Starts a request for `family` carrying generic command `cmd`.
    ///
    /// `NLM_F_REQUEST` and `NLM_F_ACK` are always set.
    #[must_use]
    pub fn new(family: u16, cmd: u8, flags: u16, limit: usize) -> Self {
        let mut buffer = Vec::with_capacity(limit.min(512));
        buffer.resize(NLMSG_HDRLEN, 0);
        buffer.extend_from_slice(&[cmd, 0, 0, 0]);
        Self {
            buffer,
            limit,
            family,
            flags: flags | NLM_F_REQUEST | NLM_F_ACK,
            cmd,
            open_nests: 0,
        }
    }

    /// Starts an nl80211 vendor request addressed to `oui`/`subcmd`.
    ///
    /// # Errors
    ///
    /// Fails when the headers do not fit the limit.
    pub fn vendor(
        family: u16,
        oui: u32,
        subcmd: u32,
        ifindex: Option<u32>,
        limit: usize,
    ) -> Result<Self, EncodingError> {
        let mut request = Self::new(family, nl80211::CMD_VENDOR, 0, limit);
        if let Some(index) = ifindex {
            request.put_u32(nl80211::ATTR_IFINDEX, index)?;
        }
        request.put_u32(nl80211::ATTR_VENDOR_ID, oui)?;
        request.put_u32(nl80211::ATTR_VENDOR_SUBCMD, subcmd)?;
        Ok(request)
    }

    /// Generic command carried by the request.
    #[must_use]
    pub const fn cmd(&self) -> u8 {
        self.cmd
    }

    /// Family id the request is addressed to.
    #[must_use]
    pub const fn family(&self) -> u16 {
        self.family
    }

    /// Bytes written so far, headers included.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether no attribute has been written yet.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.buffer.len() <= NLMSG_HDRLEN + GENL_HDRLEN
    }

    /// Appends a `u8` attribute.
    ///
    /// # Errors
    ///
    /// Fails with [`EncodingError::Overflow`] when the limit would be exceeded.
    pub fn put_u8(&mut self, kind: u16, value: u8) -> Result<(), EncodingError> {
        self.put_bytes(kind, &[value])
    }

    /// Appends a host-order `u16` attribute.
    ///
    /// # Errors
    ///
    /// Fails with [`EncodingError::Overflow`] when the limit would be exceeded.
    pub fn put_u16(&mut self, kind: u16, value: u16) -> Result<(), EncodingError> {
        self.put_bytes(kind, &value.to_ne_bytes())
    }

    /// Appends a host-order `u32` attribute.
    ///
    /// # Errors
    ///
    /// Fails with [`EncodingError::Overflow`] when the limit would be exceeded.
    pub fn put_u32(&mut self, kind: u16, value: u32) -> Result<(), EncodingError> {
        self.put_bytes(kind, &value.to_ne_bytes())
    }

    /// Appends a host-order `u64` attribute.
    ///
    /// # Errors
    ///
    /// Fails with [`EncodingError::Overflow`] when the limit would be exceeded.
    pub fn put_u64(&mut self, kind: u16, value: u64) -> Result<(), EncodingError> {
        self.put_bytes(kind, &value.to_ne_bytes())
    }

    /// Appends a NUL-terminated string attribute.
    ///
    /// # Errors
    ///
    /// Rejects strings with interior NUL bytes and fails on overflow.
    pub fn put_str(&mut self, kind: u16, value: &str) -> Result<(), EncodingError> {
        if value.as_bytes().contains(&0) {
            return Err(EncodingError::InvalidValue {
                attribute: kind,
                reason: "string contains a NUL byte",
            });
        }
        let mut payload = Vec::with_capacity(value.len() + 1);
        payload.extend_from_slice(value.as_bytes());
        payload.push(0);
        self.put_bytes(kind, &payload)
    }

    /// Appends a raw attribute.
    ///
    /// # Errors
    ///
    /// Fails when the attribute length does not fit in 16 bits or the limit
    /// would be exceeded.
    pub fn put_bytes(&mut self, kind: u16, payload: &[u8]) -> Result<(), EncodingError> {
        let length = NLA_HDRLEN + payload.len();
        let encoded = u16::try_from(length).map_err(|_| EncodingError::InvalidValue {
            attribute: kind,
            reason: "payload longer than an attribute can carry",
        })?;
        self.reserve(align(length))?;
        self.buffer.extend_from_slice(&encoded.to_ne_bytes());
        self.buffer.extend_from_slice(&kind.to_ne_bytes());
        self.buffer.extend_from_slice(payload);
        self.pad();
        Ok(())
    }

    /// Opens a nested attribute.
    ///
    /// # Errors
    ///
    /// Fails with [`EncodingError::Overflow`] when the header does not fit.
    pub fn nest_start(&mut self, kind: u16) -> Result<NestToken, EncodingError> {
        self.reserve(NLA_HDRLEN)?;
        let offset = self.buffer.len();
        self.buffer.extend_from_slice(&0_u16.to_ne_bytes());
        self.buffer
            .extend_from_slice(&(kind | NLA_F_NESTED).to_ne_bytes());
        self.open_nests += 1;
        Ok(NestToken { offset })
    }

    /// Closes the nested attribute opened with `token`.
    ///
    /// # Errors
    ///
    /// Fails when no nest is open or the nest grew past 64 KiB.
    pub fn nest_end(&mut self, token: NestToken) -> Result<(), EncodingError> {
        if self.open_nests == 0 {
            return Err(EncodingError::UnbalancedNest);
        }
        let length = self
            .buffer
            .len()
            .checked_sub(token.offset)
            .ok_or(EncodingError::UnbalancedNest)?;
        let encoded = u16::try_from(length).map_err(|_| EncodingError::Overflow {
            limit: usize::from(u16::MAX),
        })?;
        let slot = self
            .buffer
            .get_mut(token.offset..token.offset + 2)
            .ok_or(EncodingError::UnbalancedNest)?;
        slot.copy_from_slice(&encoded.to_ne_bytes());
        self.open_nests -= 1;
        Ok(())
    }

    /// Completes the header and returns the wire bytes.
    ///
    /// # Errors
    ///
    /// Fails with [`EncodingError::UnbalancedNest`] when a nest is still open.
    pub fn finish(mut self, seq: u32, port: u32) -> Result<Vec<u8>, EncodingError> {
        if self.open_nests != 0 {
            return Err(EncodingError::UnbalancedNest);
        }
        let length = u32::try_from(self.buffer.len())
            .map_err(|_| EncodingError::Overflow { limit: self.limit })?;
        let header = NlHeader {
            length,
            kind: self.family,
            flags: self.flags,
            seq,
            port,
        };
        if let Some(slot) = self.buffer.get_mut(..NLMSG_HDRLEN) {
            slot.copy_from_slice(&header.to_bytes());
        }
        Ok(self.buffer)
    }

    fn reserve(&self, additional: usize) -> Result<(), EncodingError> {
        if self.buffer.len() + additional > self.limit {
            return Err(EncodingError::Overflow { limit: self.limit });
        }
        Ok(())
    }

    fn pad(&mut self) {
        let padded = align(self.buffer.len());
        self.buffer.resize(padded, 0);
    }
}
