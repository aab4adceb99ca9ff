//! Error types for the Diameter engine.

use thiserror::Error;

/// Main error type for all engine operations.
///
/// The variants map to the recovery policy applied by the connection and
/// correlation layers:
///
/// - [`Framing`](DiameterError::Framing) and [`Decode`](DiameterError::Decode)
///   are fatal to the connection. Once the length framing invariant is
///   violated there is no safe way to find the next message boundary.
/// - [`MissingAvp`](DiameterError::MissingAvp) is recovered locally by the
///   dispatcher, which produces a `DIAMETER_UNABLE_TO_COMPLY` answer.
/// - [`CorrelationMiss`](DiameterError::CorrelationMiss) and
///   [`Timeout`](DiameterError::Timeout) are reported to the caller awaiting
///   an answer and leave the connection open.
#[derive(Debug, Error)]
pub enum DiameterError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Truncated or implausible message length on the wire.
    #[error("framing error: {0}")]
    Framing(String),

    /// Malformed header or AVP data.
    #[error("decode error: {0}")]
    Decode(String),

    /// A field does not fit its wire representation.
    #[error("encode error: {0}")]
    Encode(String),

    /// AVP name not present in the dictionary.
    #[error("unknown AVP: {0}")]
    UnknownAvp(String),

    /// A handler required an AVP the request does not carry.
    #[error("missing AVP: {0}")]
    MissingAvp(String),

    /// An answer arrived with a hop-by-hop id matching no pending exchange.
    #[error("no pending exchange for hop-by-hop id {0}")]
    CorrelationMiss(u32),

    /// The answer did not arrive within the caller-specified timeout.
    #[error("timed out waiting for answer")]
    Timeout,

    /// Connection closed while exchanges were outstanding.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Result type alias using DiameterError.
pub type Result<T> = std::result::Result<T, DiameterError>;
