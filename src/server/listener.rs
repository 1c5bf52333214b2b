//! Host-side relay listener.
//!
//! Owns the listening relay socket and the session table. Every call to
//! [`RelayListener::tick`] pumps the socket, dispatches its events to the
//! session handlers, then drains every session.
//!
//! Two configurations:
//! - **Gateway** ([`RelayListener::gateway`]): each session opens a datagram
//!   link to the local server and forwards in both directions.
//! - **Relay** ([`RelayListener::relay`]): no link; decoded payloads are
//!   returned from `tick` and the application answers with
//!   [`RelayListener::send_to_peer`].

use std::collections::VecDeque;
use std::mem;
use std::net::SocketAddr;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::config::ServerConfig;
use super::session::{Delivered, RelaySession, SessionError, SessionPolicy};
use super::table::SessionTable;
use crate::core::{
    ConnectionId, EndReason, LinkFactory, NoGateway, PeerId, PeerInfo, RelayConnection,
    RelaySocket, SocketEvent, TableError,
};
use crate::transport::PacketFramer;

/// Errors raised by the listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The relay stack is not (or no longer) initialized.
    #[error("relay socket not initialized")]
    NotInitialized,

    /// The listener was shut down.
    #[error("listener shut down")]
    Shutdown,

    /// Configuration rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Session table error.
    #[error(transparent)]
    Table(#[from] TableError),

    /// Session error.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Why a session ended.
#[derive(Debug)]
pub enum CloseReason {
    /// The relay reported the connection ended.
    Peer(EndReason),
    /// The session failed during a tick.
    Fault(SessionError),
    /// Closed through [`RelayListener::close_session`].
    Local,
    /// Closed by [`RelayListener::shutdown`].
    Shutdown,
}

/// Events raised by the listener, polled by the owner.
///
/// Each session raises at most one terminal event.
#[derive(Debug)]
pub enum ListenerEvent {
    /// A session was accepted and opened.
    SessionOpened {
        /// Connection identity.
        id: ConnectionId,
        /// Remote peer.
        peer: PeerId,
    },
    /// A connecting peer could not be opened; nothing was kept.
    SessionOpenFailed {
        /// Connection identity.
        id: ConnectionId,
        /// Remote peer.
        peer: PeerId,
        /// What failed.
        error: SessionError,
    },
    /// An open session was closed and removed.
    SessionClosed {
        /// Connection identity.
        id: ConnectionId,
        /// Why it closed.
        reason: CloseReason,
    },
}

/// Relay listener and session owner.
///
/// # Example
///
/// ```ignore
/// use relay_bridge::server::{RelayListener, ServerConfig};
/// use relay_bridge::transport::UdpLinkFactory;
///
/// let mut listener = RelayListener::gateway(socket, UdpLinkFactory::new(), &ServerConfig::default())?;
/// loop {
///     listener.tick()?;
///     while let Some(event) = listener.poll_event() {
///         println!("{event:?}");
///     }
/// }
/// ```
pub struct RelayListener<S: RelaySocket, F: LinkFactory = NoGateway> {
    socket: S,
    factory: F,
    /// Server endpoint in gateway mode.
    endpoint: Option<SocketAddr>,
    sessions: SessionTable<S::Connection, F::Link>,
    framer: PacketFramer,
    policy: SessionPolicy,
    events: VecDeque<ListenerEvent>,
    /// Socket events, reused across ticks.
    pump: Vec<SocketEvent<S::Connection>>,
    /// Payloads flushed from sessions closed by their peer.
    flushed: Vec<Delivered>,
    shut_down: bool,
}

impl<S: RelaySocket> RelayListener<S, NoGateway> {
    /// Listener that delivers payloads to the application.
    pub fn relay(socket: S, config: &ServerConfig) -> Result<Self, ServerError> {
        Self::build(socket, NoGateway, None, config)
    }
}

impl<S: RelaySocket, F: LinkFactory> RelayListener<S, F> {
    /// Listener that links every session to `config.server_endpoint`.
    pub fn gateway(socket: S, factory: F, config: &ServerConfig) -> Result<Self, ServerError> {
        Self::build(socket, factory, Some(config.server_endpoint), config)
    }

    fn build(
        socket: S,
        factory: F,
        endpoint: Option<SocketAddr>,
        config: &ServerConfig,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        Ok(Self {
            socket,
            factory,
            endpoint,
            sessions: SessionTable::new(),
            framer: config.framer(),
            policy: config.session_policy(),
            events: VecDeque::new(),
            pump: Vec::new(),
            flushed: Vec::new(),
            shut_down: false,
        })
    }

    /// A peer is connecting: create, register and open its session.
    pub fn on_connecting(&mut self, connection: S::Connection, info: PeerInfo) {
        let id = connection.id();
        let session = RelaySession::new(connection, info.peer, self.framer, self.policy);

        let opened = match self.sessions.add(session) {
            Ok(session) => session.open(&mut self.factory, self.endpoint),
            Err(rejected) => {
                // The handle shares its identity with the live session; closing
                // it would end that session too.
                warn!(error = %rejected.error(), peer = %info.peer, "connecting peer rejected");
                return;
            }
        };

        match opened {
            Ok(()) => {
                self.events.push_back(ListenerEvent::SessionOpened { id, peer: info.peer });
            }
            Err(e) => {
                let _ = self.sessions.remove(id);
                error!(%id, peer = %info.peer, error = %e, "failed to open relay session");
                self.events.push_back(ListenerEvent::SessionOpenFailed {
                    id,
                    peer: info.peer,
                    error: e,
                });
            }
        }
    }

    /// The relay finished connecting a peer.
    pub fn on_connected(&mut self, id: ConnectionId, info: PeerInfo) {
        if self.sessions.contains(id) {
            info!(%id, peer = %info.peer.label(), "peer connected");
        } else {
            warn!(%id, "connected event for unknown connection");
        }
    }

    /// The relay ended a connection: forward its queued frames, then remove
    /// and close its session.
    pub fn on_disconnected(&mut self, id: ConnectionId, info: PeerInfo) {
        let mut session = match self.sessions.remove(id) {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "disconnect for unknown connection");
                return;
            }
        };

        if info.end_reason.is_graceful() {
            info!(%id, peer = %session.peer_label(), "peer disconnected");
        } else {
            warn!(%id, peer = %session.peer_label(), reason = %info, "peer lost");
        }

        session.flush_inbound(&mut self.flushed);
        session.close();
        self.events.push_back(ListenerEvent::SessionClosed {
            id,
            reason: CloseReason::Peer(info.end_reason),
        });
    }

    /// A frame arrived from a peer.
    pub fn on_message(&mut self, id: ConnectionId, data: Vec<u8>) {
        match self.sessions.get_mut(id) {
            Ok(session) => session.enqueue_inbound(data),
            Err(e) => warn!(error = %e, len = data.len(), "dropping frame"),
        }
    }

    /// Pump the relay socket and drain every session.
    ///
    /// Returns the payloads delivered in relay mode (empty in gateway mode).
    pub fn tick(&mut self) -> Result<Vec<Delivered>, ServerError> {
        let mut delivered = Vec::new();
        self.tick_into(&mut delivered)?;
        Ok(delivered)
    }

    /// Like [`tick`](Self::tick), appending delivered payloads to `delivered`.
    pub fn tick_into(&mut self, delivered: &mut Vec<Delivered>) -> Result<(), ServerError> {
        if self.shut_down {
            return Err(ServerError::Shutdown);
        }
        if !self.socket.is_valid() {
            return Err(ServerError::NotInitialized);
        }

        let mut events = mem::take(&mut self.pump);
        self.socket.receive(&mut events);
        for event in events.drain(..) {
            self.dispatch(event);
        }
        self.pump = events;
        delivered.append(&mut self.flushed);

        let mut failed = Vec::new();
        self.sessions.for_each_mut(|session| {
            if let Err(e) = session.drain(delivered) {
                failed.push((session.id(), e));
            }
        });

        for (id, e) in failed {
            error!(%id, error = %e, "closing failed relay session");
            self.teardown(id, CloseReason::Fault(e));
        }
        Ok(())
    }

    fn dispatch(&mut self, event: SocketEvent<S::Connection>) {
        match event {
            SocketEvent::Connecting { connection, info } => self.on_connecting(connection, info),
            SocketEvent::Connected { id, info } => self.on_connected(id, info),
            SocketEvent::Disconnected { id, info } => self.on_disconnected(id, info),
            SocketEvent::Message { id, data } => {
                debug!(%id, len = data.len(), "relay frame");
                self.on_message(id, data);
            }
        }
    }

    fn teardown(&mut self, id: ConnectionId, reason: CloseReason) {
        if let Ok(mut session) = self.sessions.remove(id) {
            session.close();
            self.events.push_back(ListenerEvent::SessionClosed { id, reason });
        }
    }

    /// Send one payload to a peer (relay mode return path).
    ///
    /// A session whose send-failure policy trips is closed.
    pub fn send_to_peer(&mut self, id: ConnectionId, payload: &[u8]) -> Result<(), ServerError> {
        let session = self.sessions.get_mut(id)?;
        match session.send_to_peer(payload) {
            Ok(()) => Ok(()),
            Err(SessionError::SendFailures { count }) => {
                self.teardown(id, CloseReason::Fault(SessionError::SendFailures { count }));
                Err(SessionError::SendFailures { count }.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Close one session.
    pub fn close_session(&mut self, id: ConnectionId) -> Result<(), ServerError> {
        let mut session = self.sessions.remove(id)?;
        session.close();
        self.events.push_back(ListenerEvent::SessionClosed {
            id,
            reason: CloseReason::Local,
        });
        Ok(())
    }

    /// Close every session and the listening socket. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let sessions = self.sessions.drain_all();
        let count = sessions.len();
        for mut session in sessions {
            session.close();
            self.events.push_back(ListenerEvent::SessionClosed {
                id: session.id(),
                reason: CloseReason::Shutdown,
            });
        }
        self.socket.close();
        info!(sessions = count, "relay listener shut down");
    }

    /// Next pending event, if any.
    pub fn poll_event(&mut self) -> Option<ListenerEvent> {
        self.events.pop_front()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Look up a live session.
    pub fn session(&self, id: ConnectionId) -> Option<&RelaySession<S::Connection, F::Link>> {
        self.sessions.get(id).ok()
    }

    /// Identities of all live sessions.
    pub fn session_ids(&self) -> Vec<ConnectionId> {
        self.sessions.ids()
    }

    /// Server endpoint in gateway mode.
    pub fn endpoint(&self) -> Option<SocketAddr> {
        self.endpoint
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl<S: RelaySocket, F: LinkFactory> Drop for RelayListener<S, F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
