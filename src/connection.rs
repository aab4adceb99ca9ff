//! Server-side connection driver.
//!
//! One driver instance owns one accepted connection and runs the framing
//! loop: read a chunk, reassemble messages, decode, dispatch, write the
//! answer fully before the next read. Message handling within a connection
//! is strictly sequential; connections share nothing mutable, only the
//! read-only dictionary and registry behind `Arc`s.
//!
//! The driver also maintains the connection-level handshake state: a
//! successful capability exchange moves the peer from
//! `AwaitingCapabilityExchange` to `Established`; disconnect or a fatal
//! framing error moves it to `Closed`.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{DiameterError, Result};
use crate::handler::{CommandRegistry, PeerContext};
use crate::protocol::constants::{command, result_code};
use crate::protocol::{AvpValue, Frame, Message, MessageBuffer, DEFAULT_MAX_MESSAGE_SIZE};

/// Connection-level handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Initial state after accept, before a successful capability exchange.
    AwaitingCapabilityExchange,
    /// Capability exchange completed.
    Established,
    /// Terminal: peer disconnected or the connection failed fatally.
    Closed,
}

/// Configuration for one connection driver.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Size of the read buffer handed to the socket.
    pub read_buffer_size: usize,
    /// Maximum accepted message length.
    pub max_message_size: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 4096,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Driver for one accepted connection.
pub struct Connection<S> {
    stream: S,
    ctx: PeerContext,
    registry: Arc<CommandRegistry>,
    buffer: MessageBuffer,
    state: PeerState,
    read_buffer_size: usize,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a driver for an accepted stream.
    pub fn new(
        stream: S,
        ctx: PeerContext,
        registry: Arc<CommandRegistry>,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            stream,
            ctx,
            registry,
            buffer: MessageBuffer::with_max_message_size(config.max_message_size),
            state: PeerState::AwaitingCapabilityExchange,
            read_buffer_size: config.read_buffer_size,
        }
    }

    /// Current handshake state.
    pub fn state(&self) -> PeerState {
        self.state
    }

    /// Run the framing loop until the peer disconnects or the connection
    /// fails.
    ///
    /// A zero-byte read is the peer's shutdown signal and ends the loop
    /// cleanly. Read errors, framing errors and decode errors are fatal to
    /// the connection: it is closed without sending an answer, since the
    /// length framing invariant no longer holds.
    pub async fn run(&mut self) -> Result<()> {
        let mut read_buf = vec![0u8; self.read_buffer_size];

        loop {
            let n = match self.stream.read(&mut read_buf).await {
                Ok(0) => {
                    tracing::debug!("peer closed the connection");
                    self.state = PeerState::Closed;
                    return Ok(());
                }
                Ok(n) => n,
                Err(e) => {
                    self.state = PeerState::Closed;
                    return Err(DiameterError::Io(e));
                }
            };

            let frames = match self.buffer.push(&read_buf[..n]) {
                Ok(frames) => frames,
                Err(e) => {
                    tracing::warn!(error = %e, "closing connection on framing error");
                    self.state = PeerState::Closed;
                    return Err(e);
                }
            };

            for frame in frames {
                if let Err(e) = self.handle_frame(frame).await {
                    self.state = PeerState::Closed;
                    return Err(e);
                }
            }
        }
    }

    /// Decode, dispatch and answer one reassembled message.
    async fn handle_frame(&mut self, frame: Frame) -> Result<()> {
        let dict = self.ctx.dictionary.clone();
        let request = Message::from_frame(&frame, &dict)?;

        // Answers are only meaningful to the correlator on the initiating
        // side.
        if !request.is_request() {
            tracing::warn!(
                command_code = request.command_code(),
                hop_by_hop_id = request.hop_by_hop_id(),
                "discarding answer received on server side"
            );
            return Ok(());
        }

        let established = self.state == PeerState::Established;
        let answer = self.registry.dispatch(&request, &self.ctx, established)?;
        let bytes = answer.encode()?;

        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;

        tracing::info!(
            command = %command::name(request.command_code())
                .map(str::to_string)
                .unwrap_or_else(|| request.command_code().to_string()),
            hop_by_hop_id = request.hop_by_hop_id(),
            "answered request"
        );

        if request.command_code() == command::CAPABILITY_EXCHANGE
            && self.state == PeerState::AwaitingCapabilityExchange
            && answer_succeeded(&answer, &self.ctx)
        {
            tracing::info!(origin_host = %self.ctx.origin_host, "capability exchange completed");
            self.state = PeerState::Established;
        }

        Ok(())
    }
}

fn answer_succeeded(answer: &Message, ctx: &PeerContext) -> bool {
    answer
        .get("Result-Code", ctx.dictionary.as_ref())
        .and_then(AvpValue::as_unsigned32)
        == Some(result_code::DIAMETER_SUCCESS)
}

/// Serve one accepted connection to completion.
pub async fn serve_connection<S>(
    stream: S,
    ctx: PeerContext,
    registry: Arc<CommandRegistry>,
    config: ConnectionConfig,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    Connection::new(stream, ctx, registry, config).run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Dictionary;
    use crate::protocol::Avp;
    use bytes::Bytes;
    use tokio::io::duplex;

    fn ctx() -> PeerContext {
        PeerContext::new("server.asn.test", "asn.test", Arc::new(Dictionary::base()))
    }

    fn cer(hop_by_hop_id: u32) -> Message {
        let dict = Dictionary::base();
        let mut request = Message::request(command::CAPABILITY_EXCHANGE, 0);
        request.header.hop_by_hop_id = hop_by_hop_id;
        request.header.end_to_end_id = hop_by_hop_id ^ 0xFFFF;
        request.add("Origin-Host", "client.test", &dict).unwrap();
        request.add("Origin-Realm", "test", &dict).unwrap();
        request
    }

    fn dwr(hop_by_hop_id: u32) -> Message {
        let dict = Dictionary::base();
        let mut request = Message::request(command::DEVICE_WATCHDOG, 0);
        request.header.hop_by_hop_id = hop_by_hop_id;
        request.add("Origin-Host", "client.test", &dict).unwrap();
        request.add("Origin-Realm", "test", &dict).unwrap();
        request.add("Origin-State-Id", 42u32, &dict).unwrap();
        request
    }

    async fn exchange<S>(peer: &mut S, request: &Message) -> Message
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let dict = Dictionary::base();
        peer.write_all(&request.encode().unwrap()).await.unwrap();

        let mut buffer = MessageBuffer::new();
        let mut read_buf = [0u8; 4096];
        loop {
            let n = peer.read(&mut read_buf).await.unwrap();
            assert!(n > 0, "connection closed before answer");
            let mut frames = buffer.push(&read_buf[..n]).unwrap();
            if let Some(frame) = frames.pop() {
                return Message::from_frame(&frame, &dict).unwrap();
            }
        }
    }

    fn result_of(answer: &Message) -> Option<u32> {
        answer
            .get("Result-Code", &Dictionary::base())
            .and_then(AvpValue::as_unsigned32)
    }

    #[tokio::test]
    async fn test_capability_exchange_establishes_connection() {
        let (server_io, mut peer) = duplex(4096);
        let mut connection = Connection::new(
            server_io,
            ctx(),
            Arc::new(CommandRegistry::base()),
            ConnectionConfig::default(),
        );
        assert_eq!(connection.state(), PeerState::AwaitingCapabilityExchange);

        let driver = async {
            let _ = connection.run().await;
            connection
        };
        let client_side = async {
            let cea = exchange(&mut peer, &cer(11)).await;
            // A watchdog only succeeds once the handshake completed.
            let dwa = exchange(&mut peer, &dwr(12)).await;
            drop(peer);
            (cea, dwa)
        };
        let (connection, (cea, dwa)) = tokio::join!(driver, client_side);

        assert_eq!(cea.hop_by_hop_id(), 11);
        assert_eq!(result_of(&cea), Some(result_code::DIAMETER_SUCCESS));
        assert_eq!(dwa.hop_by_hop_id(), 12);
        assert_eq!(result_of(&dwa), Some(result_code::DIAMETER_SUCCESS));
        assert_eq!(connection.state(), PeerState::Closed);
    }

    #[tokio::test]
    async fn test_watchdog_before_handshake_is_refused() {
        let (server_io, mut peer) = duplex(4096);
        let mut connection = Connection::new(
            server_io,
            ctx(),
            Arc::new(CommandRegistry::base()),
            ConnectionConfig::default(),
        );

        let driver = async {
            let _ = connection.run().await;
        };
        let client_side = async {
            let dwa = exchange(&mut peer, &dwr(3)).await;
            drop(peer);
            dwa
        };
        let (_, dwa) = tokio::join!(driver, client_side);

        assert_eq!(result_of(&dwa), Some(result_code::DIAMETER_UNABLE_TO_COMPLY));
    }

    #[tokio::test]
    async fn test_answer_received_by_server_is_discarded() {
        let (server_io, mut peer) = duplex(4096);
        let mut connection = Connection::new(
            server_io,
            ctx(),
            Arc::new(CommandRegistry::base()),
            ConnectionConfig::default(),
        );

        let driver = tokio::spawn(async move { connection.run().await });

        // An answer (request bit clear) must produce no reply and no error.
        let mut answer = Message::answer_to(&cer(5));
        answer
            .add("Origin-Host", "client.test", &Dictionary::base())
            .unwrap();
        peer.write_all(&answer.encode().unwrap()).await.unwrap();
        drop(peer);

        let result = driver.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_avp_closes_connection() {
        let (server_io, mut peer) = duplex(4096);
        let mut connection = Connection::new(
            server_io,
            ctx(),
            Arc::new(CommandRegistry::base()),
            ConnectionConfig::default(),
        );

        let driver = tokio::spawn(async move { connection.run().await });

        // A message whose AVP region declares a length past its end.
        let mut request = cer(1);
        request.push(Avp::with_code(
            61234,
            None,
            0,
            AvpValue::Octets(Bytes::from_static(b"abcd")),
        ));
        let mut bytes = request.encode().unwrap().to_vec();
        let last_avp = bytes.len() - 12;
        bytes[last_avp + 5..last_avp + 8].copy_from_slice(&[0x00, 0xFF, 0x00]);
        peer.write_all(&bytes).await.unwrap();

        let result = driver.await.unwrap();
        assert!(matches!(result, Err(DiameterError::Decode(_))));
    }
}
