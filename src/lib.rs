//! # diameter-engine
//!
//! Core message-exchange engine for a Diameter-base-style AAA signaling
//! protocol: framing over a reliable byte stream, header and AVP codecs,
//! request/answer correlation and the base command set (capability
//! exchange, watchdog and a catch-all error answer).
//!
//! ## Architecture
//!
//! - **Protocol layer** (`protocol`): 20-byte header codec, AVP codec with
//!   grouped values, the message model and the message buffer reassembling
//!   messages from arbitrary read chunks.
//! - **Dispatch layer** (`handler`): a registry mapping command codes to
//!   synchronous answer builders, with a designated default for unsupported
//!   codes.
//! - **Correlation layer** (`correlator`): pending exchanges keyed by
//!   hop-by-hop id, with timeout and connection-closed propagation.
//! - **Drivers**: [`DiameterServer`] accepts connections and runs one
//!   [`serve_connection`] task each; [`DiameterClient`] sends requests and
//!   awaits correlated answers.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use diameter_engine::{ClientConfig, Dictionary, DiameterClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dictionary = Arc::new(Dictionary::base());
//!     let client =
//!         DiameterClient::connect("127.0.0.1:3868", ClientConfig::default(), dictionary).await?;
//!     let cea = client.send_capability_exchange().await?;
//!     println!("answer: {:?}", cea.to_map(&Dictionary::base()));
//!     Ok(())
//! }
//! ```

pub mod correlator;
pub mod dictionary;
pub mod error;
pub mod handler;
pub mod protocol;

mod client;
mod connection;
mod server;
mod writer;

pub use client::{ClientConfig, DiameterClient};
pub use connection::{serve_connection, Connection, ConnectionConfig, PeerState};
pub use correlator::Correlator;
pub use dictionary::{AvpType, Dictionary, DictionaryEntry};
pub use error::{DiameterError, Result};
pub use handler::{CommandHandler, CommandRegistry, PeerContext};
pub use protocol::Message;
pub use server::{DiameterServer, ServerConfig};
