//! # Client Configuration
//!
//! Static settings read once at startup. Every field has a default so a
//! partial JSON document (or none at all) yields a usable configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Configuration for the pipelined client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host name or IP address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Expiration applied by `set` when the caller gives none (seconds, 0 = never).
    pub default_ttl: u32,
    /// How long a caller waits for a reply when it gives no timeout.
    pub call_timeout_ms: u64,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_interval_ms: u64,
    /// Upper bound on a single TCP connect.
    pub connect_timeout_ms: u64,
    /// Upper bound on writing one request; exceeding it kills the connection.
    pub write_timeout_ms: u64,
    /// Capacity of the session mailbox.
    ///
    /// The reader task waits for mailbox space before handing over received
    /// bytes, and the actor does not drain the mailbox while a write is in
    /// progress. With deep pipelines and large responses a small capacity can
    /// stall both sides until `write_timeout_ms` drops the connection.
    pub mailbox_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: "127.0.0.1".to_string(),
            port: 11211,
            default_ttl: 0,
            call_timeout_ms: 5_000,
            reconnect_interval_ms: 1_000,
            connect_timeout_ms: 1_000,
            write_timeout_ms: 1_000,
            mailbox_capacity: 1_024,
        }
    }
}

impl ClientConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Replaces host and port from a `host:port` string.
    pub fn set_addr(&mut self, addr: &str) -> ClientResult<()> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| ClientError::InvalidAddress(addr.to_string()))?;
        let port = port
            .parse()
            .map_err(|_| ClientError::InvalidAddress(addr.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(ClientError::InvalidAddress(addr.to_string()));
        }
        self.host = host.to_string();
        self.port = port;
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ClientConfig::from_json(r#"{"port": 22122, "default_ttl": 60}"#).unwrap();
        assert_eq!(config.port, 22122);
        assert_eq!(config.default_ttl, 60);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.call_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn rejects_unknown_types() {
        assert!(ClientConfig::from_json(r#"{"port": "high"}"#).is_err());
    }

    #[test]
    fn set_addr_splits_host_and_port() {
        let mut config = ClientConfig::default();
        config.set_addr("cache.local:11311").unwrap();
        assert_eq!(config.host, "cache.local");
        assert_eq!(config.port, 11311);

        config.set_addr("[::1]:11211").unwrap();
        assert_eq!(config.host, "::1");
    }

    #[test]
    fn set_addr_rejects_garbage() {
        let mut config = ClientConfig::default();
        assert!(matches!(
            config.set_addr("no-port"),
            Err(ClientError::InvalidAddress(_))
        ));
        assert!(config.set_addr(":11211").is_err());
        assert!(config.set_addr("host:99999").is_err());
        assert_eq!(config, ClientConfig::default());
    }
}
