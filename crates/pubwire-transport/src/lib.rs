//! Transport layer for pubwire.
//!
//! A [`Transport`] owns one byte stream and turns it into two things:
//!
//! - a stream of [`Frame`] events, delivered one at a time to a
//!   [`FrameHandler`] from a dedicated read task;
//! - a [`TransportHandle`], a cheap-to-clone capability to write frames to
//!   the peer and to close the connection.
//!
//! [`Listener`] accepts TCP connections and wraps each one in a `Transport`;
//! [`connect`] dials one.
//!
//! ```text
//! TcpStream ──read until 0x0A──→ decode ──→ FrameHandler::handle(handle, frame)
//!     ▲                                              │
//!     └──────────── TransportHandle::write ◄─────────┘
//! ```

mod connection;
mod error;
mod tcp;

pub use connection::{Transport, TransportHandle};
pub use error::TransportError;
pub use tcp::{connect, Listener};

use std::fmt;
use std::future::Future;

use pubwire_protocol::Frame;

/// Opaque, process-unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Receives every frame read from a connection.
///
/// Handlers run on the connection's read task, so the next frame is not
/// read until `handle` completes. A handler that writes (an acknowledgement,
/// a fan-out) therefore holds up its own connection for as long as the
/// write takes.
///
/// Any `Fn(TransportHandle, Frame) -> impl Future<Output = ()>` closure is a
/// handler:
///
/// ```rust
/// use pubwire_protocol::{Frame, MessageType};
/// use pubwire_transport::{FrameHandler, TransportHandle};
///
/// fn echo() -> impl FrameHandler {
///     |conn: TransportHandle, frame: Frame| async move {
///         if frame.kind == MessageType::Publish {
///             let _ = conn.write(&frame).await;
///         }
///     }
/// }
/// ```
pub trait FrameHandler: Send + Sync + 'static {
    /// Handles one decoded frame. `conn` writes back to the same peer.
    fn handle(
        &self,
        conn: TransportHandle,
        frame: Frame,
    ) -> impl Future<Output = ()> + Send;
}

impl<F, Fut> FrameHandler for F
where
    F: Fn(TransportHandle, Frame) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    fn handle(
        &self,
        conn: TransportHandle,
        frame: Frame,
    ) -> impl Future<Output = ()> + Send {
        (self)(conn, frame)
    }
}
