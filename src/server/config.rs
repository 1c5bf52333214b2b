//! Bridge server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use super::listener::ServerError;
use super::session::SessionPolicy;
use crate::core::{
    DEFAULT_DATAGRAM_MTU, DEFAULT_INBOUND_QUEUE_CAPACITY, DEFAULT_SERVER_ENDPOINT,
    DEFAULT_TICK_RATE_HZ, HEADER_SIZE, MAX_TICK_RATE_HZ, MAX_UDP_PAYLOAD,
};
use crate::transport::PacketFramer;

/// Server-side bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Local server endpoint each gateway session links to.
    pub server_endpoint: SocketAddr,

    /// Maximum frame size on the datagram link.
    pub max_frame_size: usize,

    /// Inbound frames held per session before the oldest is evicted.
    pub inbound_queue_capacity: usize,

    /// Consecutive relay send failures that close a session.
    pub max_consecutive_send_failures: Option<u32>,

    /// Ticks per second.
    pub tick_rate_hz: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_endpoint: DEFAULT_SERVER_ENDPOINT,
            max_frame_size: DEFAULT_DATAGRAM_MTU,
            inbound_queue_capacity: DEFAULT_INBOUND_QUEUE_CAPACITY,
            max_consecutive_send_failures: None,
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
        }
    }
}

impl ServerConfig {
    /// Check every field is usable.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.max_frame_size <= HEADER_SIZE || self.max_frame_size > MAX_UDP_PAYLOAD {
            return Err(ServerError::InvalidConfig(format!(
                "max_frame_size must be in {}..={MAX_UDP_PAYLOAD}, got {}",
                HEADER_SIZE + 1,
                self.max_frame_size
            )));
        }
        if self.inbound_queue_capacity == 0 {
            return Err(ServerError::InvalidConfig(
                "inbound_queue_capacity must be at least 1".into(),
            ));
        }
        if self.max_consecutive_send_failures == Some(0) {
            return Err(ServerError::InvalidConfig(
                "max_consecutive_send_failures must be at least 1".into(),
            ));
        }
        if self.tick_rate_hz == 0 || self.tick_rate_hz > MAX_TICK_RATE_HZ {
            return Err(ServerError::InvalidConfig(format!(
                "tick_rate_hz must be in 1..={MAX_TICK_RATE_HZ}, got {}",
                self.tick_rate_hz
            )));
        }
        Ok(())
    }

    /// Framer for this configuration.
    pub fn framer(&self) -> PacketFramer {
        PacketFramer::new(self.max_frame_size)
    }

    /// Per-session limits for this configuration.
    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            inbound_queue_capacity: self.inbound_queue_capacity,
            max_consecutive_send_failures: self.max_consecutive_send_failures,
        }
    }

    /// Time between ticks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate_hz.max(1)
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Create a builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the local server endpoint.
    pub fn server_endpoint(mut self, endpoint: SocketAddr) -> Self {
        self.config.server_endpoint = endpoint;
        self
    }

    /// Set the maximum frame size.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set the inbound queue capacity.
    pub fn inbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.inbound_queue_capacity = capacity;
        self
    }

    /// Close sessions after `max` consecutive relay send failures.
    pub fn max_consecutive_send_failures(mut self, max: Option<u32>) -> Self {
        self.config.max_consecutive_send_failures = max;
        self
    }

    /// Set the tick rate.
    pub fn tick_rate_hz(mut self, hz: u32) -> Self {
        self.config.tick_rate_hz = hz;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<ServerConfig, ServerError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server_endpoint.port(), 32001);
        assert_eq!(config.framer().max_payload_size(), DEFAULT_DATAGRAM_MTU - HEADER_SIZE);
        assert_eq!(config.tick_interval(), Duration::from_secs(1) / 30);
    }

    #[test]
    fn test_builder() {
        let endpoint: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let config = ServerConfigBuilder::new()
            .server_endpoint(endpoint)
            .max_frame_size(512)
            .inbound_queue_capacity(16)
            .max_consecutive_send_failures(Some(5))
            .tick_rate_hz(60)
            .build()
            .unwrap();

        assert_eq!(config.server_endpoint, endpoint);
        let policy = config.session_policy();
        assert_eq!(policy.inbound_queue_capacity, 16);
        assert_eq!(policy.max_consecutive_send_failures, Some(5));
    }

    #[test]
    fn test_invalid_values_rejected() {
        for builder in [
            ServerConfigBuilder::new().max_frame_size(HEADER_SIZE),
            ServerConfigBuilder::new().max_frame_size(MAX_UDP_PAYLOAD + 1),
            ServerConfigBuilder::new().inbound_queue_capacity(0),
            ServerConfigBuilder::new().max_consecutive_send_failures(Some(0)),
            ServerConfigBuilder::new().tick_rate_hz(0),
            ServerConfigBuilder::new().tick_rate_hz(MAX_TICK_RATE_HZ + 1),
        ] {
            assert!(matches!(builder.build(), Err(ServerError::InvalidConfig(_))));
        }
    }
}
