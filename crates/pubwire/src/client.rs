//! Client side: one connection to a broker.
//!
//! Outbound frames go through a hand-off queue of capacity one, drained by a
//! single task that owns every write. Producers wait until the drain task
//! takes their frame, which is the client's only backpressure.
//!
//! ```text
//! publish/subscribe/close ──queue(1)──→ drain task ──write──→ broker
//! broker ──read task──→ InboundHandler ──→ topic callback(conn_id, data)
//! ```
//!
//! ## Why the queue holds a single frame
//!
//! - **Backpressure reaches the caller.** With room for one frame, a
//!   `publish` that finds the slot taken waits until the drain task has
//!   picked up the previous frame. A broker that reads slowly therefore
//!   slows down the code calling `publish`, instead of letting an
//!   unbounded buffer grow in memory.
//! - **One writer, in call order.** Only the drain task touches the
//!   connection's write side. Frames reach the broker in the order their
//!   `send` calls completed, and a frame is never interleaved with another.
//! - **`close` is ordered too.** The `Close` frame goes through the same
//!   queue, so everything queued before it is written first. The drain
//!   task stops after writing it, which is what closes the connection.
//!
//! A larger capacity would make `publish` return sooner, but "returned"
//! would then say even less about what the broker has seen.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pubwire_protocol::{
    Codec, Frame, JsonCodec, MessageType, PublishMsg, SubscribeMsg,
    UnsubscribeMsg,
};
use pubwire_transport::{
    connect, ConnectionId, FrameHandler, Transport, TransportHandle,
};
use tokio::sync::{mpsc, watch};

use crate::{ClientConfig, PubwireError};

/// Called for every event delivered on a subscribed topic, with this
/// client's connection id and the event's data.
type Callback = Arc<dyn Fn(ConnectionId, &[u8]) + Send + Sync>;

/// State the read task shares with the client.
struct Shared<C> {
    codec: C,
    callbacks: Mutex<HashMap<String, Callback>>,
}

impl<C> Shared<C> {
    fn callbacks(&self) -> MutexGuard<'_, HashMap<String, Callback>> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Inner<C> {
    shared: Arc<Shared<C>>,
    conn: TransportHandle,
    outbound: mpsc::Sender<Frame>,
    /// Set by the first `close()`.
    closing: AtomicBool,
    /// Flips to `true` when the read task ends.
    ended: watch::Receiver<bool>,
}

/// A connection to a pubwire broker.
///
/// Dropping the client (and every [`Subscription`]) stops the drain task,
/// which closes the connection.
pub struct Client<C: Codec = JsonCodec> {
    inner: Arc<Inner<C>>,
}

impl Client<JsonCodec> {
    /// Dials the broker using the JSON codec.
    ///
    /// # Errors
    /// Returns [`PubwireError::Connect`] if the dial fails and
    /// `config.reconnect` is off. With `reconnect` on, dialing is retried
    /// immediately until it succeeds.
    pub async fn connect(config: ClientConfig) -> Result<Self, PubwireError> {
        Self::connect_with_codec(config, JsonCodec).await
    }
}

impl<C: Codec> Client<C> {
    /// Dials the broker with a specific body codec.
    pub async fn connect_with_codec(
        config: ClientConfig,
        codec: C,
    ) -> Result<Self, PubwireError> {
        let transport = dial(&config).await?;
        let conn = transport.handle();
        tracing::info!(conn_id = %conn.id(), url = %config.url, "connected to broker");

        let shared = Arc::new(Shared {
            codec,
            callbacks: Mutex::new(HashMap::new()),
        });

        let (ended_tx, ended_rx) = watch::channel(false);
        let handler = InboundHandler {
            shared: Arc::clone(&shared),
        };
        tokio::spawn(async move {
            let conn_id = transport.id();
            let reason = transport.spawn(handler).await;
            tracing::info!(%conn_id, reason = %reason, "disconnected from broker");
            ended_tx.send_replace(true);
        });

        let (outbound, queue) = mpsc::channel(1);
        tokio::spawn(drain(queue, conn.clone()));

        Ok(Self {
            inner: Arc::new(Inner {
                shared,
                conn,
                outbound,
                closing: AtomicBool::new(false),
                ended: ended_rx,
            }),
        })
    }

    /// This client's connection id, as passed to subscription callbacks.
    pub fn id(&self) -> ConnectionId {
        self.inner.conn.id()
    }

    /// Publishes `data` to `topic`.
    ///
    /// Resolves once the frame is handed to the drain task, not when the
    /// broker acknowledges it.
    pub async fn publish(
        &self,
        topic: &str,
        data: &[u8],
    ) -> Result<(), PubwireError> {
        let body = self.inner.shared.codec.encode(&PublishMsg::new(topic, data))?;
        self.inner.send(Frame::publish(body)).await
    }

    /// Subscribes to `topic`, calling `callback` for each delivered event.
    ///
    /// A second subscribe to the same topic replaces the callback; the broker
    /// still delivers each event once.
    pub async fn subscribe<F>(
        &self,
        topic: &str,
        callback: F,
    ) -> Result<Subscription<C>, PubwireError>
    where
        F: Fn(ConnectionId, &[u8]) + Send + Sync + 'static,
    {
        let body = self.inner.shared.codec.encode(&SubscribeMsg::new(topic))?;
        self.inner
            .shared
            .callbacks()
            .insert(topic.to_string(), Arc::new(callback));

        if let Err(e) = self.inner.send(Frame::subscribe(body)).await {
            self.inner.shared.callbacks().remove(topic);
            return Err(e);
        }
        tracing::debug!(conn_id = %self.id(), topic, "subscribed");

        Ok(Subscription {
            topic: topic.to_string(),
            inner: Arc::clone(&self.inner),
        })
    }

    /// Unsubscribes from `topic` and drops its callback.
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), PubwireError> {
        self.inner.unsubscribe(topic).await
    }

    /// Tells the broker this client is leaving, then closes the connection.
    ///
    /// # Errors
    /// [`PubwireError::ClientClosed`] if `close` was already called or the
    /// connection is gone.
    pub async fn close(&self) -> Result<(), PubwireError> {
        if self.inner.closing.swap(true, Ordering::AcqRel) {
            return Err(PubwireError::ClientClosed);
        }
        self.inner
            .outbound
            .send(Frame::close(Vec::new()))
            .await
            .map_err(|_| PubwireError::ClientClosed)
    }

    /// Returns `true` once the connection is closed, by either side.
    pub fn is_closed(&self) -> bool {
        self.inner.conn.is_closed() || *self.inner.ended.borrow()
    }

    /// Waits until the connection to the broker has ended.
    pub async fn closed(&self) {
        let mut ended = self.inner.ended.clone();
        // Err means the read task is gone, which also means it ended.
        let _ = ended.wait_for(|ended| *ended).await;
    }
}

impl<C: Codec> fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.inner.conn.id())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<C: Codec> Inner<C> {
    async fn send(&self, frame: Frame) -> Result<(), PubwireError> {
        if self.closing.load(Ordering::Acquire) {
            return Err(PubwireError::ClientClosed);
        }
        self.outbound
            .send(frame)
            .await
            .map_err(|_| PubwireError::ClientClosed)
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), PubwireError> {
        let body = self.shared.codec.encode(&UnsubscribeMsg::new(topic))?;
        self.shared.callbacks().remove(topic);
        self.send(Frame::unsubscribe(body)).await?;
        tracing::debug!(conn_id = %self.conn.id(), topic, "unsubscribed");
        Ok(())
    }
}

/// A live subscription returned by [`Client::subscribe`].
///
/// Dropping it does not unsubscribe; call [`unsubscribe`](Self::unsubscribe).
pub struct Subscription<C: Codec = JsonCodec> {
    topic: String,
    inner: Arc<Inner<C>>,
}

impl<C: Codec> Subscription<C> {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Sends the matching `Unsubscribe` and drops the callback.
    pub async fn unsubscribe(self) -> Result<(), PubwireError> {
        self.inner.unsubscribe(&self.topic).await
    }
}

impl<C: Codec> fmt::Debug for Subscription<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .finish()
    }
}

async fn dial(config: &ClientConfig) -> Result<Transport, PubwireError> {
    loop {
        match connect(config.url.as_str()).await {
            Ok(transport) => return Ok(transport),
            Err(e) if config.reconnect => {
                tracing::debug!(url = %config.url, error = %e, "dial failed, retrying");
                tokio::task::yield_now().await;
            }
            Err(e) => return Err(PubwireError::Connect(e)),
        }
    }
}

/// Writes queued frames one at a time. Ends after writing `Close`, on the
/// first failed write, or when every sender is dropped, and closes the
/// connection on the way out.
async fn drain(mut queue: mpsc::Receiver<Frame>, conn: TransportHandle) {
    while let Some(frame) = queue.recv().await {
        let last = frame.kind == MessageType::Close;
        if let Err(e) = conn.write(&frame).await {
            tracing::debug!(
                conn_id = %conn.id(),
                kind = %frame.kind,
                error = %e,
                "unable to send frame"
            );
            break;
        }
        if last {
            break;
        }
    }

    queue.close();
    conn.close().await;
}

/// Handles frames the broker sends to this client.
struct InboundHandler<C> {
    shared: Arc<Shared<C>>,
}

impl<C: Codec> InboundHandler<C> {
    async fn dispatch(&self, conn: TransportHandle, frame: Frame) {
        match frame.kind {
            MessageType::Ok => {}
            MessageType::Publish => self.on_event(conn.id(), &frame.body),
            MessageType::Unsubscribe => {
                match self.shared.codec.decode::<UnsubscribeMsg>(&frame.body) {
                    Ok(msg) => {
                        tracing::debug!(
                            conn_id = %conn.id(),
                            topic = %msg.topic,
                            "broker ended subscription"
                        );
                        self.shared.callbacks().remove(&msg.topic);
                    }
                    Err(e) => tracing::warn!(
                        conn_id = %conn.id(),
                        error = %e,
                        "failed to decode unsubscribe"
                    ),
                }
            }
            MessageType::Close => {
                tracing::debug!(conn_id = %conn.id(), "broker sent close");
                conn.close().await;
            }
            MessageType::Connect | MessageType::Subscribe => {
                tracing::warn!(
                    conn_id = %conn.id(),
                    kind = %frame.kind,
                    "unsupported message type, closing"
                );
                conn.close().await;
            }
        }
    }

    fn on_event(&self, conn_id: ConnectionId, body: &[u8]) {
        let msg: PublishMsg = match self.shared.codec.decode(body) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "failed to decode event");
                return;
            }
        };

        // Clone out so the callback runs without the lock held.
        let callback = self.shared.callbacks().get(&msg.topic).cloned();
        match callback {
            Some(callback) => callback(conn_id, &msg.data),
            None => tracing::debug!(
                %conn_id,
                topic = %msg.topic,
                "event for topic without callback"
            ),
        }
    }
}

impl<C: Codec> FrameHandler for InboundHandler<C> {
    fn handle(
        &self,
        conn: TransportHandle,
        frame: Frame,
    ) -> impl Future<Output = ()> + Send {
        self.dispatch(conn, frame)
    }
}
