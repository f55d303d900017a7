//! `Broker` builder and accept loop.
//!
//! This is the entry point for running a pubwire broker. It ties the layers
//! together: transport → protocol → topics.

use std::net::SocketAddr;
use std::sync::Arc;

use pubwire_protocol::{Codec, JsonCodec};
use pubwire_store::IdentifierStore;
use pubwire_topic::{ClientId, PublishReport, Subscriber, TopicRegistry};
use pubwire_transport::{Listener, TransportError};

use crate::handler::ConnectionHandler;
use crate::{BrokerConfig, PubwireError};

/// State shared by the accept loop, every connection task, and every
/// [`BrokerHandle`].
pub(crate) struct BrokerState<C: Codec> {
    pub(crate) clients: IdentifierStore<Arc<Subscriber>>,
    pub(crate) topics: TopicRegistry,
    pub(crate) codec: C,
}

impl<C: Codec> BrokerState<C> {
    /// Forgets a client: drops it from every topic, then from the client
    /// store. Safe to call more than once.
    pub(crate) fn remove_client(&self, client_id: ClientId) {
        let topics = self.topics.remove_subscriber(client_id);
        if self.clients.delete(client_id.0) {
            tracing::info!(%client_id, topics, "client removed");
        }
    }
}

/// Builder for configuring and starting a [`Broker`].
///
/// # Example
///
/// ```rust,no_run
/// # async fn demo() -> Result<(), pubwire::PubwireError> {
/// use pubwire::Broker;
///
/// let broker = Broker::builder().port(8080).build().await?;
/// broker.run().await
/// # }
/// ```
pub struct BrokerBuilder<C: Codec = JsonCodec> {
    config: BrokerConfig,
    codec: C,
}

impl BrokerBuilder<JsonCodec> {
    /// Creates a builder with default settings and the JSON codec.
    pub fn new() -> Self {
        Self {
            config: BrokerConfig::default(),
            codec: JsonCodec,
        }
    }
}

impl Default for BrokerBuilder<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> BrokerBuilder<C> {
    /// Sets the interface to bind.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the port to bind. 0 picks a free port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the body codec. Clients must use the same one.
    pub fn codec<C2: Codec>(self, codec: C2) -> BrokerBuilder<C2> {
        BrokerBuilder {
            config: self.config,
            codec,
        }
    }

    /// Binds the listener.
    ///
    /// # Errors
    /// Returns [`PubwireError::Transport`] if the address cannot be bound.
    pub async fn build(self) -> Result<Broker<C>, PubwireError> {
        let listener = Listener::bind(&self.config.bind_addr()).await?;

        let state = Arc::new(BrokerState {
            clients: IdentifierStore::new(),
            topics: TopicRegistry::new(),
            codec: self.codec,
        });

        Ok(Broker { listener, state })
    }
}

/// A bound broker. Call [`run()`](Self::run) to start accepting clients.
pub struct Broker<C: Codec = JsonCodec> {
    listener: Listener,
    state: Arc<BrokerState<C>>,
}

impl Broker<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> BrokerBuilder<JsonCodec> {
        BrokerBuilder::new()
    }
}

impl<C: Codec> Broker<C> {
    /// Returns the local address the broker is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Returns a handle for in-process operations on this broker.
    ///
    /// Handles stay valid after `run()` takes the broker.
    pub fn handle(&self) -> BrokerHandle<C> {
        BrokerHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Runs the accept loop.
    ///
    /// Each accepted connection is registered as a client and served on its
    /// own task, so one slow connection never holds up accepting the next.
    /// Accept errors are logged and the loop continues. Runs until the task
    /// is dropped or the process ends.
    pub async fn run(self) -> Result<(), PubwireError> {
        match self.local_addr() {
            Ok(addr) => tracing::info!(%addr, "pubwire broker running"),
            Err(_) => tracing::info!("pubwire broker running"),
        }

        loop {
            match self.listener.accept().await {
                Ok((transport, addr)) => {
                    let outbound = transport.handle();
                    let client_id =
                        ClientId(self.state.clients.put_with(|id| {
                            Arc::new(Subscriber::new(ClientId(id), outbound))
                        }));
                    tracing::info!(
                        %client_id,
                        conn_id = %transport.id(),
                        %addr,
                        "client connected"
                    );

                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        let guard = ClientGuard {
                            client_id,
                            state: Arc::clone(&state),
                        };
                        let reason = transport
                            .spawn(ConnectionHandler::new(client_id, state))
                            .await;
                        log_disconnect(client_id, &reason);
                        drop(guard);
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Removes a client from the broker when its connection task exits,
/// whether it returned or unwound.
struct ClientGuard<C: Codec> {
    client_id: ClientId,
    state: Arc<BrokerState<C>>,
}

impl<C: Codec> Drop for ClientGuard<C> {
    fn drop(&mut self) {
        self.state.remove_client(self.client_id);
    }
}

fn log_disconnect(client_id: ClientId, reason: &TransportError) {
    match reason {
        TransportError::Eof | TransportError::Closed => {
            tracing::info!(%client_id, reason = %reason, "client disconnected");
        }
        _ => {
            tracing::debug!(
                %client_id,
                error = %reason,
                "client connection ended with error"
            );
        }
    }
}

/// In-process access to a broker's topics and clients. Cheap to clone.
pub struct BrokerHandle<C: Codec = JsonCodec> {
    state: Arc<BrokerState<C>>,
}

impl<C: Codec> Clone for BrokerHandle<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<C: Codec> BrokerHandle<C> {
    /// Publishes `data` to `topic` as if a client had sent it.
    ///
    /// # Errors
    /// Returns [`PubwireError::Protocol`] if the envelope cannot be framed.
    /// Failed deliveries are reported in the [`PublishReport`], not as an
    /// error.
    pub async fn publish(
        &self,
        topic: &str,
        data: &[u8],
    ) -> Result<PublishReport, PubwireError> {
        let report = self
            .state
            .topics
            .publish(topic, &self.state.codec, data)
            .await?;
        Ok(report)
    }

    /// Subscribes a connected client to `topic`.
    ///
    /// Returns `false` if the client is not connected, is closing, or was
    /// already subscribed.
    pub fn subscribe(&self, client_id: ClientId, topic: &str) -> bool {
        let Some(subscriber) = self.state.clients.get(client_id.0) else {
            return false;
        };
        if subscriber.outbound().is_closed() {
            return false;
        }

        let added = self.state.topics.subscribe(topic, &subscriber);
        // Teardown closes the transport before it sweeps the topics, so a
        // subscribe that lands after the sweep sees the closed flag here.
        if added && subscriber.outbound().is_closed() {
            self.state.topics.unsubscribe(topic, client_id);
            tracing::debug!(%client_id, topic, "client closed while subscribing");
            return false;
        }
        added
    }

    /// Unsubscribes a client from `topic`. Returns `false` if it was not
    /// subscribed.
    pub fn unsubscribe(&self, client_id: ClientId, topic: &str) -> bool {
        self.state.topics.unsubscribe(topic, client_id)
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.state.clients.len()
    }

    /// Ids of the connected clients, in connection order.
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.state.clients.ids().into_iter().map(ClientId).collect()
    }

    /// Number of topics ever created.
    pub fn topic_count(&self) -> usize {
        self.state.topics.len()
    }

    /// Names of every topic, sorted.
    pub fn topic_names(&self) -> Vec<String> {
        self.state.topics.names()
    }

    /// Number of subscribers of `topic`; 0 for an unknown topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.state
            .topics
            .get(topic)
            .map_or(0, |topic| topic.subscriber_count())
    }
}

impl<C: Codec> std::fmt::Debug for BrokerHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerHandle")
            .field("clients", &self.state.clients.len())
            .field("topics", &self.state.topics.len())
            .finish()
    }
}
