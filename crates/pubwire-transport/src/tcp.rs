//! TCP listener and dialer.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::{Transport, TransportError};

/// Accepts incoming TCP connections and wraps each in a [`Transport`].
pub struct Listener {
    listener: TcpListener,
}

impl Listener {
    /// Binds a listener to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "pubwire listener bound");
        Ok(Self { listener })
    }

    /// Waits for and accepts the next incoming connection.
    pub async fn accept(
        &self,
    ) -> Result<(Transport, SocketAddr), TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        stream
            .set_nodelay(true)
            .map_err(TransportError::AcceptFailed)?;

        let transport = Transport::new(stream);
        tracing::debug!(conn_id = %transport.id(), %addr, "accepted connection");
        Ok((transport, addr))
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// Dials a TCP peer and wraps the stream in a [`Transport`].
pub async fn connect(addr: impl ToSocketAddrs) -> std::io::Result<Transport> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(Transport::new(stream))
}
