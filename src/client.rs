//! Diameter client: builds requests and awaits correlated answers.
//!
//! The client splits its stream into a background read loop feeding the
//! [`Correlator`] and a writer task serializing outbound messages, so
//! several requests can be outstanding on one connection. Convenience
//! senders cover the base handshake: Capability-Exchange and
//! Device-Watchdog.
//!
//! # Example
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
//!
//!     let cea = client.send_capability_exchange().await?;
//!     let dwa = client.send_watchdog(1).await?;
//!     client.close().await;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;

use crate::correlator::Correlator;
use crate::dictionary::Dictionary;
use crate::error::Result;
use crate::protocol::constants::{command, standard_values};
use crate::protocol::{Message, MessageBuffer, DEFAULT_MAX_MESSAGE_SIZE};
use crate::writer::{spawn_writer_task, WriterHandle};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Origin-Host advertised in requests.
    pub origin_host: String,
    /// Origin-Realm advertised in requests.
    pub origin_realm: String,
    /// Destination-Host carried by generated requests.
    pub destination_host: String,
    /// Destination-Realm carried by generated requests.
    pub destination_realm: String,
    /// How long to wait for each answer.
    pub request_timeout: Duration,
    /// Read buffer size for the answer loop.
    pub read_buffer_size: usize,
    /// Maximum accepted message length.
    pub max_message_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            origin_host: "client.asn.test".to_string(),
            origin_realm: "asn.test".to_string(),
            destination_host: "server.asn.test".to_string(),
            destination_realm: "asn.test".to_string(),
            request_timeout: Duration::from_secs(5),
            read_buffer_size: 4096,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// A connected Diameter client.
pub struct DiameterClient {
    config: ClientConfig,
    dictionary: Arc<Dictionary>,
    correlator: Arc<Correlator>,
    writer: WriterHandle,
    end_to_end: AtomicU32,
    read_task: JoinHandle<()>,
}

impl DiameterClient {
    /// Connect to a server over TCP.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        config: ClientConfig,
        dictionary: Arc<Dictionary>,
    ) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::attach(stream, config, dictionary))
    }

    /// Attach the client to an already established byte stream.
    ///
    /// The transport only needs blocking read/write semantics and an
    /// end-of-stream signal, so tests can attach to an in-memory duplex.
    pub fn attach<S>(stream: S, config: ClientConfig, dictionary: Arc<Dictionary>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (writer, _writer_task) = spawn_writer_task(write_half);
        let correlator = Arc::new(Correlator::new());

        let read_task = tokio::spawn(Self::read_loop(
            read_half,
            correlator.clone(),
            dictionary.clone(),
            config.read_buffer_size,
            config.max_message_size,
        ));

        Self {
            config,
            dictionary,
            correlator,
            writer,
            end_to_end: AtomicU32::new(seed_end_to_end()),
            read_task,
        }
    }

    /// Answer loop: reassembles incoming messages and resolves the
    /// correlator. Ends on peer shutdown or a connection-level error, at
    /// which point every pending exchange fails with `ConnectionClosed`.
    async fn read_loop<R>(
        mut reader: R,
        correlator: Arc<Correlator>,
        dictionary: Arc<Dictionary>,
        read_buffer_size: usize,
        max_message_size: u32,
    ) where
        R: AsyncRead + Unpin,
    {
        let mut buffer = MessageBuffer::with_max_message_size(max_message_size);
        let mut read_buf = vec![0u8; read_buffer_size];

        'connection: loop {
            let n = match reader.read(&mut read_buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(error) => {
                    tracing::warn!(%error, "read failed, closing connection");
                    break;
                }
            };

            let frames = match buffer.push(&read_buf[..n]) {
                Ok(frames) => frames,
                Err(error) => {
                    tracing::warn!(%error, "framing failed, closing connection");
                    break;
                }
            };

            for frame in frames {
                let answer = match Message::from_frame(&frame, &dictionary) {
                    Ok(message) => message,
                    Err(error) => {
                        // The framing invariant no longer holds, close
                        // rather than guess the next message boundary.
                        tracing::warn!(%error, "closing connection on undecodable message");
                        break 'connection;
                    }
                };
                if let Err(error) = correlator.resolve(answer) {
                    // Non-fatal: the message is discarded, other pending
                    // exchanges are unaffected.
                    tracing::warn!(%error, "discarding unmatched answer");
                }
            }
        }

        correlator.fail_all();
    }

    /// Send a request and wait for its correlated answer.
    ///
    /// Assigns the hop-by-hop id (and the end-to-end id when unset),
    /// records the pending exchange, transmits, then waits up to the
    /// configured timeout.
    pub async fn send_request(&self, mut request: Message) -> Result<Message> {
        let hop_by_hop_id = self.correlator.next_hop_by_hop();
        request.header.hop_by_hop_id = hop_by_hop_id;
        if request.header.end_to_end_id == 0 {
            request.header.end_to_end_id = self.end_to_end.fetch_add(1, Ordering::Relaxed);
        }

        let bytes = request.encode()?;
        let pending = self.correlator.register(hop_by_hop_id);

        if let Err(error) = self.writer.send(bytes).await {
            self.correlator.abandon(pending);
            return Err(error);
        }

        self.correlator
            .await_answer(pending, self.config.request_timeout)
            .await
    }

    /// Build a request carrying the configured origin and destination.
    pub fn generic_request(&self, command_code: u32) -> Result<Message> {
        let dict = self.dictionary.as_ref();
        let mut request = Message::request(command_code, 0);
        request.add("Origin-Host", self.config.origin_host.as_str(), dict)?;
        request.add("Origin-Realm", self.config.origin_realm.as_str(), dict)?;
        request.add(
            "Destination-Host",
            self.config.destination_host.as_str(),
            dict,
        )?;
        request.add(
            "Destination-Realm",
            self.config.destination_realm.as_str(),
            dict,
        )?;
        Ok(request)
    }

    /// Send a Capability-Exchange request with the standard AVP set and
    /// wait for the answer.
    pub async fn send_capability_exchange(&self) -> Result<Message> {
        let dict = self.dictionary.as_ref();
        let mut request = self.generic_request(command::CAPABILITY_EXCHANGE)?;
        request.add("Vendor-Id", standard_values::VENDOR_ID, dict)?;
        request.add("Product-Name", standard_values::PRODUCT_NAME, dict)?;
        request.add("Origin-State-Id", 1u32, dict)?;
        request.add(
            "Supported-Vendor-Id",
            standard_values::SUPPORTED_VENDOR_ID,
            dict,
        )?;
        request.add(
            "Acct-Application-Id",
            standard_values::ACCT_APPLICATION_ID,
            dict,
        )?;
        self.send_request(request).await
    }

    /// Send a Device-Watchdog request and wait for the answer.
    pub async fn send_watchdog(&self, origin_state_id: u32) -> Result<Message> {
        let dict = self.dictionary.as_ref();
        let mut request = self.generic_request(command::DEVICE_WATCHDOG)?;
        request.add("Origin-State-Id", origin_state_id, dict)?;
        self.send_request(request).await
    }

    /// Number of exchanges still awaiting an answer.
    pub fn pending_exchanges(&self) -> usize {
        self.correlator.pending_count()
    }

    /// Close the connection, failing every pending exchange with
    /// `ConnectionClosed`.
    pub async fn close(self) {
        drop(self.writer);
        self.read_task.abort();
        self.correlator.fail_all();
    }
}

/// Seed for the end-to-end id space, mixed from system time and process id.
fn seed_end_to_end() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let pid = std::process::id() as u64;
    (nanos.rotate_left(17).wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ pid) as u32
}
