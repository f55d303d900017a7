//! Broker and client configuration.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// BrokerConfig
// ---------------------------------------------------------------------------

/// Where the broker listens.
///
/// Missing fields take their defaults when deserialized, so a config file
/// only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Interface to bind.
    pub host: String,

    /// TCP port to bind. 0 picks a free port.
    pub port: u16,
}

impl BrokerConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// The `host:port` string handed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// How a client reaches the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Broker address as `host:port`.
    pub url: String,

    /// Keep re-dialing, with no backoff, until the broker accepts.
    pub reconnect: bool,
}

impl ClientConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8080".to_string(),
            reconnect: false,
        }
    }
}
