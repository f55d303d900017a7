//! # pubwire
//!
//! A topic-based publish/subscribe broker and its client, speaking a small
//! framed protocol over TCP.
//!
//! Clients subscribe to named topics and publish opaque byte payloads to
//! them. The broker fans every publish out to the topic's current
//! subscribers. Topics are created on first subscribe.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pubwire::prelude::*;
//!
//! # async fn demo() -> Result<(), PubwireError> {
//! let broker = Broker::builder().host("127.0.0.1").port(8080).build().await?;
//! tokio::spawn(broker.run());
//!
//! let client = Client::connect(ClientConfig::default()).await?;
//! let _prices = client
//!     .subscribe("prices", |conn_id, data: &[u8]| {
//!         println!("{conn_id}: {}", String::from_utf8_lossy(data));
//!     })
//!     .await?;
//! client.publish("prices", b"42").await?;
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod handler;
mod server;

pub use client::{Client, Subscription};
pub use config::{BrokerConfig, ClientConfig};
pub use error::PubwireError;
pub use server::{Broker, BrokerBuilder, BrokerHandle};

pub use pubwire_protocol as protocol;
pub use pubwire_store as store;
pub use pubwire_topic as topic;
pub use pubwire_transport as transport;

/// Common imports for applications built on pubwire.
pub mod prelude {
    pub use crate::{
        Broker, BrokerBuilder, BrokerConfig, BrokerHandle, Client,
        ClientConfig, PubwireError, Subscription,
    };
    pub use pubwire_protocol::{Codec, JsonCodec, MsgPackCodec};
    pub use pubwire_topic::{ClientId, PublishReport};
    pub use pubwire_transport::ConnectionId;
}
