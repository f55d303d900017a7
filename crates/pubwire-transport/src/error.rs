use pubwire_protocol::ProtocolError;

/// Errors that can occur in the transport layer.
///
/// Several variants are not failures so much as reasons a connection ended:
/// [`Transport::spawn`](crate::Transport::spawn) always returns one of
/// `Eof`, `Closed`, `ReceiveFailed`, `Framing` or `ReadTask`.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer closed its side of the stream.
    #[error("connection closed by peer")]
    Eof,

    /// The transport was closed locally.
    #[error("transport closed")]
    Closed,

    /// A write was attempted after the transport was closed.
    /// The recipient is gone; retrying will not help.
    #[error("writing to a closed transport")]
    WriteToClosed,

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The peer sent bytes that are not a valid frame.
    #[error("framing error: {0}")]
    Framing(#[source] ProtocolError),

    /// An outbound frame could not be encoded.
    #[error("encode failed: {0}")]
    Encode(#[source] ProtocolError),

    /// The read task panicked or was cancelled.
    #[error("read task failed: {0}")]
    ReadTask(#[source] tokio::task::JoinError),
}
