//! Envelopes carried inside frame bodies.
//!
//! These are the business-level messages. They are serialized with a
//! [`Codec`](crate::Codec) and placed in the body of a [`Frame`](crate::Frame)
//! whose type says which envelope to expect.

use serde::{Deserialize, Serialize};

/// Body of a `Subscribe` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeMsg {
    pub topic: String,
}

/// Body of an `Unsubscribe` frame, in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeMsg {
    pub topic: String,
}

/// Body of a `Publish` frame.
///
/// Client → server it is a request to fan `data` out to `topic`.
/// Server → client it is one delivered event. `data` is opaque to the
/// broker; the application picks its own serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishMsg {
    pub topic: String,
    pub data: Vec<u8>,
}

impl SubscribeMsg {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }
}

impl UnsubscribeMsg {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }
}

impl PublishMsg {
    pub fn new(topic: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            data: data.into(),
        }
    }
}
