//! AVP encoding and decoding.
//!
//! Implements the variable-length attribute record:
//! ```text
//! ┌──────────┬───────┬──────────┬───────────────┬──────────┬─────────┐
//! │ Code     │ Flags │ Length   │ Vendor Id     │ Data     │ Padding │
//! │ 4 bytes  │ 1 byte│ 3 bytes  │ 4 bytes (opt) │ n bytes  │ 0-3     │
//! └──────────┴───────┴──────────┴───────────────┴──────────┴─────────┘
//! ```
//!
//! The length field counts header plus data and excludes the trailing
//! padding; the encoded record is always padded to a multiple of 4 bytes.
//! The vendor id is present exactly when the Vendor-Specific flag is set.
//!
//! Values are typed through the [`Dictionary`]. An AVP whose code the
//! dictionary does not know decodes to opaque octets with its name
//! synthesized from the numeric code; it is never discarded.

use std::net::IpAddr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::dictionary::{AvpType, Dictionary};
use crate::error::{DiameterError, Result};
use crate::protocol::header::MAX_U24;

/// AVP header size without the optional vendor id.
pub const AVP_HEADER_SIZE: usize = 8;

/// Size of the optional vendor id field.
pub const VENDOR_ID_SIZE: usize = 4;

/// Flag constants for the AVP flags byte.
pub mod avp_flags {
    /// Vendor id field present.
    pub const VENDOR_SPECIFIC: u8 = 0b0000_0001;
    /// Receiver must understand this AVP.
    pub const MANDATORY: u8 = 0b0000_0010;
    /// End-to-end protected.
    pub const PROTECTED: u8 = 0b0000_0100;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// A typed AVP value.
///
/// Scalar variants cover the base-protocol data types; `Grouped` nests an
/// ordered sequence of child AVPs.
#[derive(Debug, Clone, PartialEq)]
pub enum AvpValue {
    /// Opaque bytes. Also the fallback for codes the dictionary does not
    /// know.
    Octets(Bytes),
    /// UTF-8 string.
    Utf8(String),
    /// 32-bit unsigned integer.
    Unsigned32(u32),
    /// 32-bit signed integer; also carries enumerated values.
    Integer32(i32),
    /// 64-bit unsigned integer.
    Unsigned64(u64),
    /// IP address with its 2-byte family prefix on the wire.
    Address(IpAddr),
    /// Ordered sequence of child AVPs.
    Grouped(Vec<Avp>),
}

impl AvpValue {
    fn matches(&self, data_type: AvpType) -> bool {
        matches!(
            (self, data_type),
            (AvpValue::Octets(_), AvpType::OctetString)
                | (AvpValue::Utf8(_), AvpType::Utf8String)
                | (AvpValue::Unsigned32(_), AvpType::Unsigned32)
                | (AvpValue::Integer32(_), AvpType::Integer32)
                | (AvpValue::Unsigned64(_), AvpType::Unsigned64)
                | (AvpValue::Address(_), AvpType::Address)
                | (AvpValue::Grouped(_), AvpType::Grouped)
        )
    }

    /// View as a string, if this is a UTF-8 value.
    pub fn as_utf8(&self) -> Option<&str> {
        match self {
            AvpValue::Utf8(s) => Some(s),
            _ => None,
        }
    }

    /// View as an unsigned 32-bit integer.
    pub fn as_unsigned32(&self) -> Option<u32> {
        match self {
            AvpValue::Unsigned32(v) => Some(*v),
            _ => None,
        }
    }

    /// View as a grouped value.
    pub fn as_grouped(&self) -> Option<&[Avp]> {
        match self {
            AvpValue::Grouped(children) => Some(children),
            _ => None,
        }
    }
}

impl From<&str> for AvpValue {
    fn from(value: &str) -> Self {
        AvpValue::Utf8(value.to_string())
    }
}

impl From<String> for AvpValue {
    fn from(value: String) -> Self {
        AvpValue::Utf8(value)
    }
}

impl From<u32> for AvpValue {
    fn from(value: u32) -> Self {
        AvpValue::Unsigned32(value)
    }
}

impl From<i32> for AvpValue {
    fn from(value: i32) -> Self {
        AvpValue::Integer32(value)
    }
}

impl From<u64> for AvpValue {
    fn from(value: u64) -> Self {
        AvpValue::Unsigned64(value)
    }
}

impl From<IpAddr> for AvpValue {
    fn from(value: IpAddr) -> Self {
        AvpValue::Address(value)
    }
}

impl From<Bytes> for AvpValue {
    fn from(value: Bytes) -> Self {
        AvpValue::Octets(value)
    }
}

impl From<Vec<u8>> for AvpValue {
    fn from(value: Vec<u8>) -> Self {
        AvpValue::Octets(Bytes::from(value))
    }
}

impl From<Vec<Avp>> for AvpValue {
    fn from(value: Vec<Avp>) -> Self {
        AvpValue::Grouped(value)
    }
}

/// One attribute-value pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Avp {
    /// AVP code.
    pub code: u32,
    /// Flags byte (see [`avp_flags`]).
    pub flags: u8,
    /// Vendor id, present exactly when the Vendor-Specific flag is set.
    pub vendor_id: Option<u32>,
    /// The typed value.
    pub value: AvpValue,
}

impl Avp {
    /// Create an AVP by dictionary name.
    ///
    /// Resolves code, vendor id and declared type through the dictionary.
    /// Fails with `UnknownAvp` when the name is absent and with an encode
    /// error when the value does not match the declared type. Base AVPs are
    /// flagged mandatory.
    pub fn new(name: &str, value: impl Into<AvpValue>, dict: &Dictionary) -> Result<Self> {
        let entry = dict
            .resolve_name(name)
            .ok_or_else(|| DiameterError::UnknownAvp(name.to_string()))?;
        let value = value.into();
        if !value.matches(entry.data_type) {
            return Err(DiameterError::Encode(format!(
                "value variant does not match declared type of {}",
                name
            )));
        }
        let vendor_id = (entry.vendor_id != 0).then_some(entry.vendor_id);
        Ok(Self::with_code(
            entry.code,
            vendor_id,
            avp_flags::MANDATORY,
            value,
        ))
    }

    /// Create an AVP from an explicit code, bypassing the dictionary.
    ///
    /// The Vendor-Specific flag is derived from the vendor id, so the flags
    /// byte and the optional field can never disagree.
    pub fn with_code(code: u32, vendor_id: Option<u32>, flags: u8, value: AvpValue) -> Self {
        let flags = match vendor_id {
            Some(_) => flags | avp_flags::VENDOR_SPECIFIC,
            None => flags & !avp_flags::VENDOR_SPECIFIC,
        };
        Self {
            code,
            flags,
            vendor_id,
            value,
        }
    }

    /// Resolve this AVP's name through the dictionary.
    ///
    /// Unknown codes synthesize the numeric code as the name, preserving
    /// forward compatibility with unrecognized extensions.
    pub fn name(&self, dict: &Dictionary) -> String {
        match dict.resolve_code(self.code, self.vendor_id.unwrap_or(0)) {
            Some(entry) => entry.name.clone(),
            None => self.code.to_string(),
        }
    }

    /// Check if the Vendor-Specific flag is set.
    #[inline]
    pub fn is_vendor_specific(&self) -> bool {
        avp_flags::has_flag(self.flags, avp_flags::VENDOR_SPECIFIC)
    }

    /// Check if the Mandatory flag is set.
    #[inline]
    pub fn is_mandatory(&self) -> bool {
        avp_flags::has_flag(self.flags, avp_flags::MANDATORY)
    }

    /// Check if the Protected flag is set.
    #[inline]
    pub fn is_protected(&self) -> bool {
        avp_flags::has_flag(self.flags, avp_flags::PROTECTED)
    }

    /// Check if the dictionary has no entry for this AVP's code.
    pub fn is_unrecognized(&self, dict: &Dictionary) -> bool {
        dict.resolve_code(self.code, self.vendor_id.unwrap_or(0))
            .is_none()
    }

    /// Encode this AVP into `buf`, zero-padded to 4-byte alignment.
    ///
    /// Grouped values recursively encode their children (each padded) and
    /// the parent length is computed over the concatenation.
    pub fn encode_to(&self, buf: &mut BytesMut) -> Result<()> {
        let start = buf.len();
        buf.put_u32(self.code);
        buf.put_u8(self.flags);
        buf.put_slice(&[0, 0, 0]); // length, patched below
        if let Some(vendor_id) = self.vendor_id {
            buf.put_u32(vendor_id);
        }

        match &self.value {
            AvpValue::Octets(data) => buf.put_slice(data),
            AvpValue::Utf8(s) => buf.put_slice(s.as_bytes()),
            AvpValue::Unsigned32(v) => buf.put_u32(*v),
            AvpValue::Integer32(v) => buf.put_i32(*v),
            AvpValue::Unsigned64(v) => buf.put_u64(*v),
            AvpValue::Address(addr) => match addr {
                IpAddr::V4(v4) => {
                    buf.put_u16(1);
                    buf.put_slice(&v4.octets());
                }
                IpAddr::V6(v6) => {
                    buf.put_u16(2);
                    buf.put_slice(&v6.octets());
                }
            },
            AvpValue::Grouped(children) => {
                for child in children {
                    child.encode_to(buf)?;
                }
            }
        }

        let avp_len = buf.len() - start;
        if avp_len as u32 > MAX_U24 {
            return Err(DiameterError::Encode(format!(
                "AVP length {} exceeds 24-bit field",
                avp_len
            )));
        }
        let len_bytes = (avp_len as u32).to_be_bytes();
        buf[start + 5..start + 8].copy_from_slice(&len_bytes[1..]);

        // Padding is on the wire but not in the length field.
        let pad = (4 - avp_len % 4) % 4;
        buf.put_bytes(0, pad);
        Ok(())
    }

    /// Decode one AVP record. `bytes` must span exactly the unpadded record
    /// as produced by [`split_avps`].
    pub fn decode(bytes: &[u8], dict: &Dictionary) -> Result<Self> {
        if bytes.len() < AVP_HEADER_SIZE {
            return Err(DiameterError::Decode(format!(
                "AVP record needs {} bytes, got {}",
                AVP_HEADER_SIZE,
                bytes.len()
            )));
        }
        let code = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let flags = bytes[4];
        let length = u32::from_be_bytes([0, bytes[5], bytes[6], bytes[7]]) as usize;
        if length > bytes.len() {
            return Err(DiameterError::Decode(format!(
                "AVP length {} overruns record of {} bytes",
                length,
                bytes.len()
            )));
        }

        let (vendor_id, data_start) = if avp_flags::has_flag(flags, avp_flags::VENDOR_SPECIFIC) {
            if length < AVP_HEADER_SIZE + VENDOR_ID_SIZE {
                return Err(DiameterError::Decode(
                    "vendor-specific AVP too short for vendor id".to_string(),
                ));
            }
            let vendor = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
            (Some(vendor), AVP_HEADER_SIZE + VENDOR_ID_SIZE)
        } else {
            if length < AVP_HEADER_SIZE {
                return Err(DiameterError::Decode(
                    "AVP length shorter than its header".to_string(),
                ));
            }
            (None, AVP_HEADER_SIZE)
        };

        let data = &bytes[data_start..length];
        let value = match dict.resolve_code(code, vendor_id.unwrap_or(0)) {
            Some(entry) => decode_value(entry.data_type, data, dict)?,
            // Unknown code: keep the value opaque rather than discarding it.
            None => AvpValue::Octets(Bytes::copy_from_slice(data)),
        };

        Ok(Self {
            code,
            flags,
            vendor_id,
            value,
        })
    }
}

fn decode_value(data_type: AvpType, data: &[u8], dict: &Dictionary) -> Result<AvpValue> {
    match data_type {
        AvpType::OctetString => Ok(AvpValue::Octets(Bytes::copy_from_slice(data))),
        AvpType::Utf8String => String::from_utf8(data.to_vec())
            .map(AvpValue::Utf8)
            .map_err(|e| DiameterError::Decode(format!("invalid UTF-8 in AVP data: {}", e))),
        AvpType::Unsigned32 => {
            let bytes = fixed_data::<4>(data, "Unsigned32")?;
            Ok(AvpValue::Unsigned32(u32::from_be_bytes(bytes)))
        }
        AvpType::Integer32 => {
            let bytes = fixed_data::<4>(data, "Integer32")?;
            Ok(AvpValue::Integer32(i32::from_be_bytes(bytes)))
        }
        AvpType::Unsigned64 => {
            let bytes = fixed_data::<8>(data, "Unsigned64")?;
            Ok(AvpValue::Unsigned64(u64::from_be_bytes(bytes)))
        }
        AvpType::Address => decode_address(data),
        AvpType::Grouped => {
            let children = split_avps(data)?
                .into_iter()
                .map(|raw| Avp::decode(raw, dict))
                .collect::<Result<Vec<_>>>()?;
            Ok(AvpValue::Grouped(children))
        }
    }
}

fn fixed_data<const N: usize>(data: &[u8], type_name: &str) -> Result<[u8; N]> {
    data.try_into().map_err(|_| {
        DiameterError::Decode(format!(
            "{} needs {} data bytes, got {}",
            type_name,
            N,
            data.len()
        ))
    })
}

fn decode_address(data: &[u8]) -> Result<AvpValue> {
    if data.len() < 2 {
        return Err(DiameterError::Decode(
            "address AVP shorter than family prefix".to_string(),
        ));
    }
    let family = u16::from_be_bytes([data[0], data[1]]);
    let addr = &data[2..];
    match family {
        1 => {
            let octets: [u8; 4] = fixed_data(addr, "IPv4 address")?;
            Ok(AvpValue::Address(IpAddr::from(octets)))
        }
        2 => {
            let octets: [u8; 16] = fixed_data(addr, "IPv6 address")?;
            Ok(AvpValue::Address(IpAddr::from(octets)))
        }
        other => Err(DiameterError::Decode(format!(
            "unsupported address family {}",
            other
        ))),
    }
}

/// Split a buffer of concatenated AVP records into unpadded record slices.
///
/// Scans length-delimited records until the buffer is exhausted. Fails with
/// a decode error on a record whose declared length would overrun the
/// buffer or is shorter than the AVP header.
pub fn split_avps(bytes: &[u8]) -> Result<Vec<&[u8]>> {
    let mut records = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let rest = &bytes[offset..];
        if rest.len() < AVP_HEADER_SIZE {
            return Err(DiameterError::Decode(format!(
                "trailing {} bytes too short for an AVP header",
                rest.len()
            )));
        }
        let length = u32::from_be_bytes([0, rest[5], rest[6], rest[7]]) as usize;
        if length < AVP_HEADER_SIZE {
            return Err(DiameterError::Decode(format!(
                "AVP length {} shorter than its header",
                length
            )));
        }
        if length > rest.len() {
            return Err(DiameterError::Decode(format!(
                "AVP length {} overruns buffer of {} remaining bytes",
                length,
                rest.len()
            )));
        }
        records.push(&rest[..length]);

        let padded = (length + 3) & !3;
        offset += padded.min(rest.len());
    }

    Ok(records)
}
