//! Diameter message model: one header plus an ordered sequence of AVPs.
//!
//! The AVP sequence is authoritative and order-preserving; duplicate codes
//! are legal and round-trip as distinct entries. The name-keyed view
//! ([`Message::get`], [`Message::to_map`]) retains only the last occurrence
//! per name and is lossy by design.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};

use crate::dictionary::Dictionary;
use crate::error::Result;
use crate::protocol::avp::{split_avps, Avp, AvpValue};
use crate::protocol::header::{Header, HEADER_SIZE};
use crate::protocol::message_buffer::Frame;

/// A complete Diameter message.
///
/// Constructed from decoded bytes on receipt or built programmatically for
/// sending; treated as immutable once handed to the codec for encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Message header.
    pub header: Header,
    /// Ordered AVP sequence.
    pub avps: Vec<Avp>,
}

impl Message {
    /// Create an empty request message for a command code.
    pub fn request(command_code: u32, application_id: u32) -> Self {
        Self {
            header: Header::request(command_code, application_id),
            avps: Vec::new(),
        }
    }

    /// Create an empty answer for a request, echoing its hop-by-hop and
    /// end-to-end ids.
    pub fn answer_to(request: &Message) -> Self {
        Self {
            header: Header::answer_to(&request.header),
            avps: Vec::new(),
        }
    }

    /// Append an AVP constructed by dictionary name.
    pub fn add(&mut self, name: &str, value: impl Into<AvpValue>, dict: &Dictionary) -> Result<()> {
        self.avps.push(Avp::new(name, value, dict)?);
        Ok(())
    }

    /// Append an already constructed AVP.
    pub fn push(&mut self, avp: Avp) {
        self.avps.push(avp);
    }

    /// Encode the message to wire bytes.
    ///
    /// The header length field is computed over the exact encoded size,
    /// header plus padded AVP region.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + 64 * self.avps.len());
        buf.resize(HEADER_SIZE, 0);
        for avp in &self.avps {
            avp.encode_to(&mut buf)?;
        }

        let mut header = self.header;
        header.length = buf.len() as u32;
        header.encode_into(&mut buf[..HEADER_SIZE])?;
        Ok(buf.freeze())
    }

    /// Decode a message from one reassembled frame.
    pub fn from_frame(frame: &Frame, dict: &Dictionary) -> Result<Self> {
        let avps = split_avps(&frame.payload)?
            .into_iter()
            .map(|raw| Avp::decode(raw, dict))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            header: frame.header,
            avps,
        })
    }

    /// Decode a message from a complete wire buffer.
    pub fn decode(bytes: &[u8], dict: &Dictionary) -> Result<Self> {
        let header = Header::decode(bytes)?;
        let avps = split_avps(&bytes[HEADER_SIZE..])?
            .into_iter()
            .map(|raw| Avp::decode(raw, dict))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { header, avps })
    }

    /// Look up an AVP value by name; the last occurrence wins.
    ///
    /// Names the dictionary does not know fall back to numeric-code match,
    /// mirroring the synthesized names of unrecognized AVPs.
    pub fn get(&self, name: &str, dict: &Dictionary) -> Option<&AvpValue> {
        let (code, vendor_id) = match dict.resolve_name(name) {
            Some(entry) => (entry.code, entry.vendor_id),
            None => (name.parse().ok()?, 0),
        };
        self.avps
            .iter()
            .rev()
            .find(|avp| avp.code == code && avp.vendor_id.unwrap_or(0) == vendor_id)
            .map(|avp| &avp.value)
    }

    /// Name-keyed view of the AVPs. Lossy: duplicate names collapse to the
    /// last occurrence.
    pub fn to_map(&self, dict: &Dictionary) -> HashMap<String, AvpValue> {
        self.avps
            .iter()
            .map(|avp| (avp.name(dict), avp.value.clone()))
            .collect()
    }

    /// Get the command code.
    #[inline]
    pub fn command_code(&self) -> u32 {
        self.header.command_code
    }

    /// Get the hop-by-hop id.
    #[inline]
    pub fn hop_by_hop_id(&self) -> u32 {
        self.header.hop_by_hop_id
    }

    /// Get the end-to-end id.
    #[inline]
    pub fn end_to_end_id(&self) -> u32 {
        self.header.end_to_end_id
    }

    /// Check if this is a request.
    #[inline]
    pub fn is_request(&self) -> bool {
        self.header.is_request()
    }
}
