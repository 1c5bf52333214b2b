//! Client configuration and transport factory.

use thiserror::Error;

use super::transport::ClientBridgeTransport;
use crate::core::{HEADER_SIZE, MAX_UDP_PAYLOAD, PeerId, RelayClient};
use crate::transport::{ConnectionSettings, TransportFactory};

/// Errors that can occur configuring the client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// No host peer was given.
    #[error("host peer not set")]
    MissingHost,

    /// Configuration rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Host peer to join.
    pub host: PeerId,

    /// Settings passed to [`Transport::open`](crate::transport::Transport::open).
    pub settings: ConnectionSettings,
}

impl ClientConfig {
    /// Configuration joining `host` with default settings.
    pub fn new(host: PeerId) -> Self {
        Self {
            host,
            settings: ConnectionSettings::default(),
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    host: Option<PeerId>,
    settings: ConnectionSettings,
}

impl ClientConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host peer.
    pub fn host(mut self, host: PeerId) -> Self {
        self.host = Some(host);
        self
    }

    /// Set the maximum frame size.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.settings.max_frame_size = size;
        self
    }

    /// Build the client configuration.
    pub fn build(self) -> Result<ClientConfig, ClientError> {
        let host = self.host.ok_or(ClientError::MissingHost)?;
        let size = self.settings.max_frame_size;
        if size <= HEADER_SIZE || size > MAX_UDP_PAYLOAD {
            return Err(ClientError::InvalidConfig(format!(
                "max_frame_size must be in {}..={MAX_UDP_PAYLOAD}, got {size}",
                HEADER_SIZE + 1
            )));
        }
        Ok(ClientConfig {
            host,
            settings: self.settings,
        })
    }
}

/// Creates a fresh [`ClientBridgeTransport`] for every join attempt.
#[derive(Debug, Clone)]
pub struct RelayTransportFactory<C> {
    client: C,
    config: ClientConfig,
}

impl<C> RelayTransportFactory<C> {
    /// Factory joining `config.host` through `client`.
    pub fn new(client: C, config: ClientConfig) -> Self {
        Self { client, config }
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl<C: RelayClient + Clone> TransportFactory for RelayTransportFactory<C> {
    type Transport = ClientBridgeTransport<C>;

    fn create(&self) -> ClientBridgeTransport<C> {
        ClientBridgeTransport::new(self.client.clone(), self.config.host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DEFAULT_DATAGRAM_MTU;
    use crate::transport::{LoopbackNetwork, Transport, TransportState};

    #[test]
    fn test_builder_requires_host() {
        assert_eq!(ClientConfigBuilder::new().build(), Err(ClientError::MissingHost));
    }

    #[test]
    fn test_builder_validates_frame_size() {
        let err = ClientConfigBuilder::new()
            .host(PeerId::new(1))
            .max_frame_size(4)
            .build()
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidConfig(_)));

        let config = ClientConfigBuilder::new().host(PeerId::new(1)).build().unwrap();
        assert_eq!(config.settings.max_frame_size, DEFAULT_DATAGRAM_MTU);
    }

    #[test]
    fn test_factory_creates_independent_transports() {
        let network = LoopbackNetwork::new();
        let factory = RelayTransportFactory::new(
            network.client(PeerId::new(2)),
            ClientConfig::new(PeerId::new(1)),
        );

        let mut first = factory.create();
        let second = factory.create();
        assert_eq!(first.host(), PeerId::new(1));

        first.close();
        assert_eq!(first.state(), TransportState::Closed);
        assert_eq!(second.state(), TransportState::Opening);
    }
}
