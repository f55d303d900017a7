//! Topics, subscribers, and fan-out for pubwire.
//!
//! # Key types
//!
//! - [`TopicRegistry`]: name → topic, with atomic get-or-create
//! - [`Topic`]: one named channel and its subscribers
//! - [`Subscriber`]: a connected client as the topics see it, an id and a
//!   way to write frames to it
//! - [`PublishReport`]: what happened during one fan-out

mod registry;
mod subscriber;
mod topic;

pub use registry::TopicRegistry;
pub use subscriber::{ClientId, Subscriber};
pub use topic::{PublishReport, Topic};
