//! Topic registry: creates, tracks, and routes publishes to topics.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use pubwire_protocol::{Codec, ProtocolError};

use crate::{ClientId, PublishReport, Subscriber, Topic};

/// Maps topic names to topics.
///
/// Topics are created on first subscribe and live for the rest of the
/// registry's life, even with no subscribers left. Publishing to a name
/// nobody ever subscribed to does not create it.
///
/// This is the entry point for topic operations from the broker's
/// connection handlers.
#[derive(Default)]
pub struct TopicRegistry {
    topics: RwLock<HashMap<String, Arc<Topic>>>,
}

impl TopicRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the topic called `name`, creating it if needed.
    ///
    /// Concurrent first calls for the same name all receive the same topic:
    /// the existence check is repeated under the write lock.
    pub fn get_or_create(&self, name: &str) -> Arc<Topic> {
        if let Some(topic) = self.read().get(name) {
            return Arc::clone(topic);
        }

        let mut topics = self.write();
        let topic = topics.entry(name.to_owned()).or_insert_with(|| {
            tracing::info!(topic = name, "topic created");
            Arc::new(Topic::new(name))
        });
        Arc::clone(topic)
    }

    /// Returns the topic called `name`, if it exists.
    pub fn get(&self, name: &str) -> Option<Arc<Topic>> {
        self.read().get(name).cloned()
    }

    /// Subscribes a client to `name`, creating the topic if needed.
    /// Returns `false` if the client was already subscribed.
    pub fn subscribe(&self, name: &str, subscriber: &Arc<Subscriber>) -> bool {
        self.get_or_create(name).subscribe(subscriber)
    }

    /// Unsubscribes a client from `name`. Unknown topics and absent
    /// subscriptions are no-ops that return `false`.
    pub fn unsubscribe(&self, name: &str, client_id: ClientId) -> bool {
        self.get(name)
            .is_some_and(|topic| topic.unsubscribe(client_id))
    }

    /// Fans `data` out to every subscriber of `name`.
    ///
    /// An unknown topic yields an empty report.
    pub async fn publish<C: Codec>(
        &self,
        name: &str,
        codec: &C,
        data: &[u8],
    ) -> Result<PublishReport, ProtocolError> {
        match self.get(name) {
            Some(topic) => topic.publish(codec, data).await,
            None => {
                tracing::debug!(topic = name, "publish to unknown topic dropped");
                Ok(PublishReport::default())
            }
        }
    }

    /// Removes a client from every topic it is subscribed to.
    /// Returns the number of topics it was removed from.
    pub fn remove_subscriber(&self, client_id: ClientId) -> usize {
        let topics: Vec<Arc<Topic>> = self.read().values().cloned().collect();
        let removed = topics
            .iter()
            .filter(|topic| topic.unsubscribe(client_id))
            .count();

        if removed > 0 {
            tracing::debug!(%client_id, topics = removed, "subscriber removed");
        }
        removed
    }

    /// Number of topics ever created.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Topic names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Topic>>> {
        self.topics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Topic>>> {
        self.topics.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TopicRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicRegistry")
            .field("topics", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pubwire_protocol::JsonCodec;
    use pubwire_transport::Transport;
    use tokio::io::duplex;

    use super::*;

    fn subscriber(id: u64) -> Arc<Subscriber> {
        let (local, _remote) = duplex(1024);
        let transport = Transport::new(local);
        Arc::new(Subscriber::new(ClientId(id), transport.handle()))
    }

    // =====================================================================
    // get_or_create() / get()
    // =====================================================================

    #[test]
    fn test_get_or_create_returns_same_topic() {
        let registry = TopicRegistry::new();
        let a = registry.get_or_create("prices");
        let b = registry.get_or_create("prices");

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        assert_eq!(a.name(), "prices");
    }

    #[test]
    fn test_get_unknown_returns_none() {
        let registry = TopicRegistry::new();
        assert!(registry.get("nope").is_none());
        assert!(registry.is_empty());
    }

    // =====================================================================
    // subscribe() / unsubscribe()
    // =====================================================================

    #[test]
    fn test_subscribe_creates_topic() {
        let registry = TopicRegistry::new();
        assert!(registry.subscribe("prices", &subscriber(1)));
        assert_eq!(registry.names(), vec!["prices".to_string()]);
        assert_eq!(registry.get("prices").unwrap().subscriber_count(), 1);
    }

    #[test]
    fn test_unsubscribe_unknown_topic_does_not_create_it() {
        let registry = TopicRegistry::new();
        assert!(!registry.unsubscribe("ghost", ClientId(1)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_topic_outlives_last_subscriber() {
        let registry = TopicRegistry::new();
        registry.subscribe("prices", &subscriber(1));
        assert!(registry.unsubscribe("prices", ClientId(1)));

        let topic = registry.get("prices").expect("topic is kept");
        assert_eq!(topic.subscriber_count(), 0);
    }

    // =====================================================================
    // remove_subscriber()
    // =====================================================================

    #[test]
    fn test_remove_subscriber_clears_every_topic() {
        let registry = TopicRegistry::new();
        let gone = subscriber(1);
        let stays = subscriber(2);
        for name in ["a", "b", "c"] {
            registry.subscribe(name, &gone);
        }
        registry.subscribe("b", &stays);

        assert_eq!(registry.remove_subscriber(ClientId(1)), 3);
        for name in ["a", "b", "c"] {
            assert!(!registry.get(name).unwrap().is_subscribed(ClientId(1)));
        }
        assert!(registry.get("b").unwrap().is_subscribed(ClientId(2)));
        assert_eq!(registry.remove_subscriber(ClientId(1)), 0);
    }

    // =====================================================================
    // publish()
    // =====================================================================

    #[tokio::test]
    async fn test_publish_unknown_topic_is_empty_and_creates_nothing() {
        let registry = TopicRegistry::new();
        let report = registry.publish("nobody", &JsonCodec, b"1").await.unwrap();

        assert_eq!(report.attempted(), 0);
        assert!(registry.get("nobody").is_none());
    }
}
