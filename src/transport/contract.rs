//! The generic transport contract used by the application on the join path.
//!
//! The application only talks to [`Transport`], so it does not care whether
//! packets go straight to the server or through a relay.

use std::net::SocketAddr;

use super::error::{TransportError, TransportResult};
use crate::core::DEFAULT_DATAGRAM_MTU;

/// Transport lifecycle.
///
/// Transitions are monotonic: `Opening -> Open -> Closed`. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// Not yet connected.
    #[default]
    Opening,
    /// Connected.
    Open,
    /// Closed.
    Closed,
}

/// Events raised by a transport, polled by the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// `open` started the connection.
    Opened,
    /// The connection failed or was ended.
    Error(TransportError),
}

/// Settings handed to [`Transport::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Maximum encoded frame size.
    pub max_frame_size: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_DATAGRAM_MTU,
        }
    }
}

/// A packet transport.
pub trait Transport {
    /// Current state.
    fn state(&self) -> TransportState;

    /// Bytes of header this transport adds to every payload.
    fn header_size(&self) -> usize;

    /// Whether delivery is reliable.
    fn is_reliable(&self) -> bool;

    /// Short name for diagnostics.
    fn description(&self) -> &str;

    /// Start connecting. Raises [`TransportEvent::Opened`] on success.
    fn open(&mut self, endpoint: SocketAddr, settings: &ConnectionSettings) -> TransportResult<()>;

    /// Mark the transport as about to disconnect. Subsequent sends carry the
    /// final/reliable hint so the disconnect notice is not dropped.
    fn prepare_disconnect(&mut self);

    /// Send one payload. The payload is copied before the call returns.
    fn send(&mut self, payload: &[u8]) -> TransportResult<()>;

    /// Append every available payload to `buffer`; returns how many were added.
    ///
    /// Never blocks.
    fn receive(&mut self, buffer: &mut Vec<Vec<u8>>) -> usize;

    /// Close the transport.
    fn close(&mut self);

    /// Next pending event, if any.
    fn poll_event(&mut self) -> Option<TransportEvent>;
}

/// Builds transports for the application.
pub trait TransportFactory {
    /// Transport type.
    type Transport: Transport;

    /// Create a new, unopened transport.
    fn create(&self) -> Self::Transport;
}

impl From<TransportError> for TransportEvent {
    fn from(error: TransportError) -> Self {
        TransportEvent::Error(error)
    }
}
