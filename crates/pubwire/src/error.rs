//! Unified error type for pubwire.

use pubwire_protocol::ProtocolError;
use pubwire_transport::TransportError;

/// Top-level error that wraps the errors of every pubwire crate.
///
/// The `#[from]` conversions let `?` lift sub-crate errors directly.
/// Not-found outcomes (unknown topic, absent subscription) are never errors;
/// the operations that can hit them return `bool` or `Option`.
#[derive(Debug, thiserror::Error)]
pub enum PubwireError {
    /// A transport-level error (accept, send, receive, framing).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (envelope encode or decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Dialing the broker failed and reconnecting is disabled.
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// The client was closed, or its connection to the broker ended.
    #[error("client is closed")]
    ClientClosed,
}
