//! A single topic: its subscribers and its fan-out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pubwire_protocol::{Codec, Frame, ProtocolError, PublishMsg, TERMINATOR};
use pubwire_store::IdentifierStore;
use pubwire_transport::TransportError;

use crate::{ClientId, Subscriber};

/// A named channel. Publishers send data to it; subscribers receive it.
///
/// Subscribers live in the topic's own [`IdentifierStore`], keyed by a
/// per-topic slot id. `index` maps each client to its slot so that
/// subscribe is idempotent and unsubscribe is a direct lookup.
///
/// Lock order is `index` then the store's lock. Publishing only takes the
/// store's read lock, so fan-out never waits on a subscribe in progress for
/// longer than one insertion.
pub struct Topic {
    name: String,
    subscribers: IdentifierStore<Arc<Subscriber>>,
    index: Mutex<HashMap<ClientId, u64>>,
}

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscribers: IdentifierStore::new(),
            index: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a subscriber. Returns `false` if it was already subscribed.
    pub fn subscribe(&self, subscriber: &Arc<Subscriber>) -> bool {
        let mut index = self.index();
        if index.contains_key(&subscriber.id()) {
            return false;
        }

        let slot = self.subscribers.put(Arc::clone(subscriber));
        index.insert(subscriber.id(), slot);
        tracing::debug!(
            topic = %self.name,
            client_id = %subscriber.id(),
            slot,
            "subscribed"
        );
        true
    }

    /// Removes a subscriber. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, client_id: ClientId) -> bool {
        let mut index = self.index();
        let Some(slot) = index.remove(&client_id) else {
            return false;
        };

        self.subscribers.delete(slot);
        tracing::debug!(topic = %self.name, %client_id, "unsubscribed");
        true
    }

    pub fn is_subscribed(&self, client_id: ClientId) -> bool {
        self.index().contains_key(&client_id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns a snapshot of the current subscribers.
    pub fn subscribers(&self) -> Vec<Arc<Subscriber>> {
        let mut snapshot = Vec::with_capacity(self.subscribers.len());
        self.subscribers
            .for_each(|_, subscriber| snapshot.push(Arc::clone(subscriber)));
        snapshot
    }

    /// Delivers `data` to every current subscriber.
    ///
    /// The envelope is encoded once. Subscribers are snapshotted first and
    /// written to one after another, outside any lock. A failed write is
    /// logged and recorded in the report; it does not stop delivery to the
    /// remaining subscribers and is not retried.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] if the envelope cannot be encoded into a
    /// frame body. Nothing is delivered in that case.
    pub async fn publish<C: Codec>(
        &self,
        codec: &C,
        data: &[u8],
    ) -> Result<PublishReport, ProtocolError> {
        let body = codec.encode(&PublishMsg::new(self.name.as_str(), data))?;
        if body.contains(&TERMINATOR) {
            return Err(ProtocolError::TerminatorInBody);
        }
        let frame = Frame::publish(body);

        let mut report = PublishReport::default();
        for subscriber in self.subscribers() {
            match subscriber.deliver(&frame).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        topic = %self.name,
                        client_id = %subscriber.id(),
                        error = %e,
                        "delivery failed"
                    );
                    report.failed.push((subscriber.id(), e));
                }
            }
        }

        tracing::debug!(
            topic = %self.name,
            delivered = report.delivered,
            failed = report.failed.len(),
            "published"
        );
        Ok(report)
    }

    fn index(&self) -> MutexGuard<'_, HashMap<ClientId, u64>> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Default)]
pub struct PublishReport {
    /// Number of subscribers the frame was written to.
    pub delivered: usize,
    /// Subscribers whose write failed, with the reason.
    pub failed: Vec<(ClientId, TransportError)>,
}

impl PublishReport {
    /// Number of subscribers a delivery was attempted for.
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed.len()
    }

    /// Returns `true` if every attempted delivery succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
