//! Collaborator traits for the two substrates the bridge joins.
//!
//! The relay side (connection-oriented, NAT-traversing) is described by
//! [`RelaySocket`] / [`RelayConnection`] for hosts and [`RelayClient`] /
//! [`RelayClientConnection`] for joining peers. The server side (local,
//! best-effort datagrams) is described by [`DatagramLink`] and
//! [`LinkFactory`].
//!
//! # Threading
//!
//! Implementations MUST deliver events only from their `receive` call, on the
//! thread that drives the tick. A relay library that raises callbacks on its
//! own threads has to queue them internally and hand them out from `receive`.

use std::net::SocketAddr;

use super::error::LinkError;
use super::types::{ConnectionId, PeerId, PeerInfo, SendMode, SendResult};

/// One relay connection as seen by the hosting side.
pub trait RelayConnection {
    /// Identity of this connection.
    fn id(&self) -> ConnectionId;

    /// Accept a pending incoming connection.
    fn accept(&mut self) -> SendResult;

    /// Send one frame. The bytes are copied before the call returns.
    fn send(&mut self, frame: &[u8], mode: SendMode) -> SendResult;

    /// Close the connection. Returns `false` if the relay refused.
    fn close(&mut self) -> bool;
}

/// Lifecycle and data events from a listening relay socket.
#[derive(Debug)]
pub enum SocketEvent<C> {
    /// A peer is connecting; the connection is pending until accepted.
    Connecting {
        /// Handle for the new connection.
        connection: C,
        /// Peer metadata.
        info: PeerInfo,
    },
    /// The connection finished its handshake.
    Connected {
        /// Connection identity.
        id: ConnectionId,
        /// Peer metadata.
        info: PeerInfo,
    },
    /// The connection ended.
    Disconnected {
        /// Connection identity.
        id: ConnectionId,
        /// Peer metadata, including the end reason.
        info: PeerInfo,
    },
    /// A frame arrived.
    Message {
        /// Connection identity.
        id: ConnectionId,
        /// Frame bytes (owned copy).
        data: Vec<u8>,
    },
}

/// A listening relay socket accepting inbound peers.
pub trait RelaySocket {
    /// Connection handle type.
    type Connection: RelayConnection;

    /// Whether the underlying relay stack is initialized and usable.
    fn is_valid(&self) -> bool;

    /// Pump the socket, appending every pending event to `events`.
    ///
    /// Never blocks.
    fn receive(&mut self, events: &mut Vec<SocketEvent<Self::Connection>>);

    /// Close the listening socket.
    fn close(&mut self);
}

/// Events delivered to the joining side of a relay connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Connection attempt started.
    Connecting(PeerInfo),
    /// Host accepted the connection.
    Connected(PeerInfo),
    /// Connection ended.
    Disconnected(PeerInfo),
    /// A frame arrived from the host.
    Message(Vec<u8>),
}

/// Outbound relay connection held by a joining peer.
pub trait RelayClientConnection {
    /// Identity of this connection.
    fn id(&self) -> ConnectionId;

    /// Pump the connection, appending every pending event to `events`.
    fn receive(&mut self, events: &mut Vec<ClientEvent>);

    /// Send one frame. The bytes are copied before the call returns.
    fn send(&mut self, frame: &[u8], mode: SendMode) -> SendResult;

    /// Close the connection. With `linger`, queued reliable frames are
    /// flushed before the connection goes away.
    fn close(&mut self, linger: bool);
}

/// Relay client stack of a joining peer.
pub trait RelayClient {
    /// Connection type produced by [`RelayClient::connect`].
    type Connection: RelayClientConnection;

    /// Whether the relay stack is initialized and usable.
    fn is_valid(&self) -> bool;

    /// Start a relayed connection to `host`.
    ///
    /// Failures surface later as a [`ClientEvent::Disconnected`].
    fn connect(&mut self, host: PeerId) -> Self::Connection;
}

/// State of a datagram link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Still being set up.
    Opening,
    /// Usable.
    Open,
    /// Closed or failed.
    Closed,
}

/// Local datagram path to the server.
pub trait DatagramLink {
    /// Current state.
    fn state(&self) -> LinkState;

    /// Send one payload as a single datagram.
    fn send(&mut self, payload: &[u8]) -> Result<(), LinkError>;

    /// Append every available payload to `out` without blocking.
    ///
    /// An `Err` is the link's error event: the link is no longer usable.
    fn receive(&mut self, out: &mut Vec<Vec<u8>>) -> Result<usize, LinkError>;

    /// Close the link.
    fn close(&mut self);
}

/// Opens datagram links to the server, one per relay session.
pub trait LinkFactory {
    /// Link type.
    type Link: DatagramLink;

    /// Open a link to `endpoint`.
    fn open(&mut self, endpoint: SocketAddr) -> Result<Self::Link, LinkError>;
}

/// Link type for listeners that forward payloads to the application
/// instead of a server. It has no values.
#[derive(Debug)]
pub enum NoLink {}

impl DatagramLink for NoLink {
    fn state(&self) -> LinkState {
        match *self {}
    }

    fn send(&mut self, _payload: &[u8]) -> Result<(), LinkError> {
        match *self {}
    }

    fn receive(&mut self, _out: &mut Vec<Vec<u8>>) -> Result<usize, LinkError> {
        match *self {}
    }

    fn close(&mut self) {
        match *self {}
    }
}

/// Factory placeholder for the relay configuration; never opens a link.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGateway;

impl LinkFactory for NoGateway {
    type Link = NoLink;

    fn open(&mut self, _endpoint: SocketAddr) -> Result<NoLink, LinkError> {
        Err(LinkError::Unsupported)
    }
}
