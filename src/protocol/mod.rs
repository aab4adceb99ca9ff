//! Protocol module: wire format, AVP codec, message model and framing.
//!
//! This module implements the binary layer of the engine:
//! - 20-byte header encoding/decoding
//! - AVP encoding/decoding, including nested grouped AVPs
//! - the message model joining one header with an ordered AVP sequence
//! - the message buffer reassembling messages from arbitrary read chunks

mod avp;
pub mod constants;
mod header;
mod message;
mod message_buffer;

pub use avp::{avp_flags, split_avps, Avp, AvpValue, AVP_HEADER_SIZE, VENDOR_ID_SIZE};
pub use header::{flags, Header, DIAMETER_VERSION, HEADER_SIZE, MAX_U24};
pub use message::Message;
pub use message_buffer::{Frame, MessageBuffer, DEFAULT_MAX_MESSAGE_SIZE};
