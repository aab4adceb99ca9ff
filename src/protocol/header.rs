//! Wire format encoding and decoding for the Diameter header.
//!
//! Implements the 20-byte fixed header:
//! ```text
//! ┌─────────┬──────────┬───────┬──────────┬──────────┬──────────┬──────────┐
//! │ Version │ Length   │ Flags │ Command  │ App Id   │ HopByHop │ EndToEnd │
//! │ 1 byte  │ 3 bytes  │ 1 byte│ 3 bytes  │ 4 bytes  │ 4 bytes  │ 4 bytes  │
//! └─────────┴──────────┴───────┴──────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian. The length field counts the whole
//! message: header plus the padded AVP region.

use crate::error::{DiameterError, Result};

/// Header size in bytes (fixed, exactly 20).
pub const HEADER_SIZE: usize = 20;

/// The only protocol version this engine speaks.
pub const DIAMETER_VERSION: u8 = 1;

/// Largest value a 3-byte wire field can hold.
pub const MAX_U24: u32 = 0x00FF_FFFF;

/// Flag constants for the header flags byte.
pub mod flags {
    /// Request (1) or answer (0).
    pub const REQUEST: u8 = 0b0000_0001;
    /// Message may be proxied.
    pub const PROXIABLE: u8 = 0b0000_0010;
    /// Message is a protocol error answer.
    pub const ERROR: u8 = 0b0000_0100;
    /// Message is a potential retransmission.
    pub const RETRANSMITTED: u8 = 0b0000_1000;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Decoded Diameter header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol version, always [`DIAMETER_VERSION`].
    pub version: u8,
    /// Total message length in bytes, header included (3 bytes on the wire).
    pub length: u32,
    /// Flags byte (see [`flags`]).
    pub flags: u8,
    /// Command code (3 bytes on the wire).
    pub command_code: u32,
    /// Application id.
    pub application_id: u32,
    /// Hop-by-hop id, the request/answer correlation key.
    pub hop_by_hop_id: u32,
    /// End-to-end id, preserved across retransmissions.
    pub end_to_end_id: u32,
}

impl Header {
    /// Create a request header. Length and ids are filled in at encode/send
    /// time.
    pub fn request(command_code: u32, application_id: u32) -> Self {
        Self {
            version: DIAMETER_VERSION,
            length: 0,
            flags: flags::REQUEST,
            command_code,
            application_id,
            hop_by_hop_id: 0,
            end_to_end_id: 0,
        }
    }

    /// Create the answer header for a request: same command code and
    /// application id, hop-by-hop and end-to-end ids echoed, request bit
    /// cleared.
    pub fn answer_to(request: &Header) -> Self {
        Self {
            version: DIAMETER_VERSION,
            length: 0,
            flags: request.flags & !flags::REQUEST & !flags::RETRANSMITTED,
            command_code: request.command_code,
            application_id: request.application_id,
            hop_by_hop_id: request.hop_by_hop_id,
            end_to_end_id: request.end_to_end_id,
        }
    }

    /// Encode the header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use diameter_engine::protocol::{Header, HEADER_SIZE};
    ///
    /// let mut header = Header::request(257, 0);
    /// header.length = 20;
    /// let bytes = header.encode().unwrap();
    /// assert_eq!(bytes.len(), HEADER_SIZE);
    /// ```
    pub fn encode(&self) -> Result<[u8; HEADER_SIZE]> {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Encode the header into an existing buffer of at least
    /// [`HEADER_SIZE`] bytes.
    ///
    /// Fails with an encode error if the length or command code exceed
    /// their 3-byte wire fields.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() < HEADER_SIZE {
            return Err(DiameterError::Encode(
                "header buffer shorter than 20 bytes".to_string(),
            ));
        }
        if self.length > MAX_U24 {
            return Err(DiameterError::Encode(format!(
                "message length {} exceeds 24-bit field",
                self.length
            )));
        }
        if self.command_code > MAX_U24 {
            return Err(DiameterError::Encode(format!(
                "command code {} exceeds 24-bit field",
                self.command_code
            )));
        }

        buf[0] = self.version;
        buf[1..4].copy_from_slice(&self.length.to_be_bytes()[1..]);
        buf[4] = self.flags;
        buf[5..8].copy_from_slice(&self.command_code.to_be_bytes()[1..]);
        buf[8..12].copy_from_slice(&self.application_id.to_be_bytes());
        buf[12..16].copy_from_slice(&self.hop_by_hop_id.to_be_bytes());
        buf[16..20].copy_from_slice(&self.end_to_end_id.to_be_bytes());
        Ok(())
    }

    /// Decode a header from bytes (Big Endian).
    ///
    /// Fails with a decode error if the buffer is shorter than
    /// [`HEADER_SIZE`] or the version byte is unrecognized.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(DiameterError::Decode(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }
        if buf[0] != DIAMETER_VERSION {
            return Err(DiameterError::Decode(format!(
                "unrecognized protocol version {}",
                buf[0]
            )));
        }
        Ok(Self {
            version: buf[0],
            length: u32::from_be_bytes([0, buf[1], buf[2], buf[3]]),
            flags: buf[4],
            command_code: u32::from_be_bytes([0, buf[5], buf[6], buf[7]]),
            application_id: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            hop_by_hop_id: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
            end_to_end_id: u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]),
        })
    }

    /// Check if this is a request.
    #[inline]
    pub fn is_request(&self) -> bool {
        flags::has_flag(self.flags, flags::REQUEST)
    }

    /// Check if the message may be proxied.
    #[inline]
    pub fn is_proxiable(&self) -> bool {
        flags::has_flag(self.flags, flags::PROXIABLE)
    }

    /// Check if this is an error answer.
    #[inline]
    pub fn is_error(&self) -> bool {
        flags::has_flag(self.flags, flags::ERROR)
    }

    /// Check if this is a potential retransmission.
    #[inline]
    pub fn is_retransmitted(&self) -> bool {
        flags::has_flag(self.flags, flags::RETRANSMITTED)
    }
}
