use std::fmt;

use pubwire_protocol::Frame;
use pubwire_transport::{TransportError, TransportHandle};

/// Identifier the broker assigns to a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// A connected client, as referenced by the topics it subscribed to.
///
/// The broker owns the record (through its client store); topics hold
/// `Arc` references to it.
#[derive(Debug)]
pub struct Subscriber {
    id: ClientId,
    outbound: TransportHandle,
}

impl Subscriber {
    pub fn new(id: ClientId, outbound: TransportHandle) -> Self {
        Self { id, outbound }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// The connection this subscriber receives frames on.
    pub fn outbound(&self) -> &TransportHandle {
        &self.outbound
    }

    /// Writes one frame to this subscriber.
    pub async fn deliver(&self, frame: &Frame) -> Result<(), TransportError> {
        self.outbound.write(frame).await
    }
}
