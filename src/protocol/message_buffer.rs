//! Message buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management and a state machine for
//! handling fragmented messages:
//! - `WaitingForHeader`: need at least 20 bytes
//! - `WaitingForBody`: header parsed, need the rest of the declared length
//!
//! Reads of arbitrary size are appended and every complete message is
//! extracted; a remainder stays buffered for the next message, so several
//! pipelined messages in a single read come out in order.

use bytes::{Bytes, BytesMut};

use crate::error::{DiameterError, Result};
use crate::protocol::header::{Header, HEADER_SIZE};

/// Default maximum message size accepted from a peer (1 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// One reassembled message: its header and the raw AVP region.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// AVP region bytes (everything after the header).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and AVP region.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Re-encode the frame to its exact wire bytes.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.resize(HEADER_SIZE, 0);
        self.header.encode_into(&mut buf[..HEADER_SIZE])?;
        buf.extend_from_slice(&self.payload);
        Ok(buf.freeze())
    }
}

/// State machine for message parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for a complete header (need 20 bytes).
    WaitingForHeader,
    /// Header parsed, waiting for the AVP region.
    WaitingForBody { header: Header, remaining: usize },
}

/// Buffer accumulating incoming bytes and extracting complete messages.
pub struct MessageBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum accepted message length.
    max_message_size: u32,
}

impl MessageBuffer {
    /// Create a message buffer with the default maximum message size.
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a message buffer with a custom maximum message size.
    pub fn with_max_message_size(max_message_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4 * 1024),
            state: State::WaitingForHeader,
            max_message_size,
        }
    }

    /// Push data into the buffer and extract all complete messages.
    ///
    /// Returns every message completed by this chunk, possibly none. A
    /// framing or header decode error is fatal to the connection; the caller
    /// must stop reading.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        match &self.state {
            State::WaitingForHeader => {
                if self.buffer.len() < HEADER_SIZE {
                    return Ok(None);
                }

                let header = Header::decode(&self.buffer[..HEADER_SIZE])?;

                if header.length < HEADER_SIZE as u32 {
                    return Err(DiameterError::Framing(format!(
                        "message length {} shorter than the header",
                        header.length
                    )));
                }
                if header.length > self.max_message_size {
                    return Err(DiameterError::Framing(format!(
                        "message length {} exceeds maximum {}",
                        header.length, self.max_message_size
                    )));
                }

                let _ = self.buffer.split_to(HEADER_SIZE);
                let remaining = header.length as usize - HEADER_SIZE;

                if remaining == 0 {
                    return Ok(Some(Frame::new(header, Bytes::new())));
                }

                self.state = State::WaitingForBody { header, remaining };
                self.try_extract_one()
            }

            State::WaitingForBody { header, remaining } => {
                let remaining = *remaining;
                if self.buffer.len() < remaining {
                    return Ok(None);
                }

                let payload = self.buffer.split_to(remaining).freeze();
                let header = *header;
                self.state = State::WaitingForHeader;

                Ok(Some(Frame::new(header, payload)))
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset the state machine.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Dictionary;
    use crate::protocol::constants::command;
    use crate::protocol::message::Message;

    fn sample_message(hop_by_hop_id: u32) -> Bytes {
        let dict = Dictionary::base();
        let mut msg = Message::request(command::CAPABILITY_EXCHANGE, 0);
        msg.header.hop_by_hop_id = hop_by_hop_id;
        msg.add("Origin-Host", "client.test", &dict).unwrap();
        msg.add("Origin-Realm", "test", &dict).unwrap();
        msg.encode().unwrap()
    }

    #[test]
    fn test_single_complete_message() {
        let mut buffer = MessageBuffer::new();
        let bytes = sample_message(1);

        let frames = buffer.push(&bytes).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.hop_by_hop_id, 1);
        assert_eq!(frames[0].to_bytes().unwrap(), bytes);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_two_messages_in_one_push() {
        let mut buffer = MessageBuffer::new();
        let first = sample_message(1);
        let second = sample_message(2);

        let mut combined = first.to_vec();
        combined.extend_from_slice(&second);

        let frames = buffer.push(&combined).unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].header.hop_by_hop_id, 1);
        assert_eq!(frames[1].header.hop_by_hop_id, 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_delivery_7_13_rest() {
        let mut buffer = MessageBuffer::new();
        let bytes = sample_message(42);

        assert!(buffer.push(&bytes[..7]).unwrap().is_empty());
        assert!(buffer.push(&bytes[7..20]).unwrap().is_empty());
        let frames = buffer.push(&bytes[20..]).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = MessageBuffer::new();
        let bytes = sample_message(7);

        let mut all = Vec::new();
        for byte in bytes.iter() {
            all.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all.len(), 1);
        assert_eq!(all[0].to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_complete_message_plus_partial_next() {
        let mut buffer = MessageBuffer::new();
        let first = sample_message(1);
        let second = sample_message(2);

        let mut data = first.to_vec();
        data.extend_from_slice(&second[..9]);

        let frames = buffer.push(&data).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.hop_by_hop_id, 1);

        let frames = buffer.push(&second[9..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.hop_by_hop_id, 2);
    }

    #[test]
    fn test_header_only_message() {
        let mut buffer = MessageBuffer::new();
        let msg = Message::request(command::DEVICE_WATCHDOG, 0);
        let bytes = msg.encode().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);

        let frames = buffer.push(&bytes).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].payload.is_empty());
    }

    #[test]
    fn test_implausible_length_rejected() {
        let mut buffer = MessageBuffer::new();
        let mut bytes = sample_message(1).to_vec();
        // Declare a length shorter than the fixed header.
        bytes[1..4].copy_from_slice(&[0, 0, 10]);

        let result = buffer.push(&bytes);
        assert!(matches!(result, Err(DiameterError::Framing(_))));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut buffer = MessageBuffer::with_max_message_size(64);
        let mut bytes = sample_message(1).to_vec();
        bytes[1..4].copy_from_slice(&[0x01, 0x00, 0x00]);

        let result = buffer.push(&bytes);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_bad_version_rejected() {
        let mut buffer = MessageBuffer::new();
        let mut bytes = sample_message(1).to_vec();
        bytes[0] = 9;

        assert!(matches!(
            buffer.push(&bytes),
            Err(DiameterError::Decode(_))
        ));
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = MessageBuffer::new();
        let bytes = sample_message(1);

        buffer.push(&bytes[..25]).unwrap();
        assert!(!buffer.is_empty());

        buffer.clear();
        assert!(buffer.is_empty());

        // A fresh full message still parses after the reset.
        let frames = buffer.push(&bytes).unwrap();
        assert_eq!(frames.len(), 1);
    }
}
