//! In-process relay network.
//!
//! Implements both sides of the relay traits on top of a shared hub, with
//! the same event shape a real relay library produces: a host listens under
//! its [`PeerId`], clients connect to that id, the host accepts, and either
//! side can close. Nothing is delivered until the receiving side pumps its
//! `receive` call, which keeps the single-threaded tick model intact.
//!
//! Delivery is lossless and ordered regardless of [`SendMode`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::core::{
    ClientEvent, ConnectionId, ConnectionStatus, EndReason, PeerId, PeerInfo, RelayClient,
    RelayClientConnection, RelayConnection, RelaySocket, SendMode, SendResult, SocketEvent,
};

/// Largest message the loopback relay accepts.
pub const LOOPBACK_MAX_MESSAGE: usize = 512 * 1024;

#[derive(Debug)]
enum HostEvent {
    Connecting { id: ConnectionId, info: PeerInfo },
    Connected { id: ConnectionId, info: PeerInfo },
    Disconnected { id: ConnectionId, info: PeerInfo },
    Message { id: ConnectionId, data: Vec<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipePhase {
    Pending,
    Connected,
    Closed,
}

#[derive(Debug)]
struct Pipe {
    host: PeerId,
    client: PeerId,
    phase: PipePhase,
    to_client: VecDeque<ClientEvent>,
    host_released: bool,
    client_released: bool,
}

#[derive(Debug)]
struct Hub {
    valid: bool,
    next_id: u32,
    listeners: HashMap<PeerId, VecDeque<HostEvent>>,
    pipes: HashMap<ConnectionId, Pipe>,
}

impl Hub {
    fn new() -> Self {
        Self {
            valid: true,
            next_id: 1,
            listeners: HashMap::new(),
            pipes: HashMap::new(),
        }
    }

    fn push_host(&mut self, host: PeerId, event: HostEvent) {
        if let Some(queue) = self.listeners.get_mut(&host) {
            queue.push_back(event);
        }
    }

    fn connect(&mut self, client: PeerId, host: PeerId) -> ConnectionId {
        let id = ConnectionId::new(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);

        let host_info = PeerInfo::new(host).with_status(ConnectionStatus::Connecting);
        let mut pipe = Pipe {
            host,
            client,
            phase: PipePhase::Pending,
            to_client: VecDeque::from([ClientEvent::Connecting(host_info)]),
            host_released: false,
            client_released: false,
        };

        if self.listeners.contains_key(&host) {
            let info = PeerInfo::new(client).with_status(ConnectionStatus::Connecting);
            self.push_host(host, HostEvent::Connecting { id, info });
        } else {
            debug!(%id, %host, "loopback: no listener for host");
            pipe.phase = PipePhase::Closed;
            pipe.host_released = true;
            pipe.to_client.push_back(ClientEvent::Disconnected(
                PeerInfo::new(host)
                    .with_status(ConnectionStatus::ProblemDetectedLocally)
                    .with_end_reason(EndReason::Timeout),
            ));
        }

        self.pipes.insert(id, pipe);
        id
    }

    fn accept(&mut self, id: ConnectionId) -> SendResult {
        let Some(pipe) = self.pipes.get_mut(&id) else {
            return SendResult::NoConnection;
        };
        match pipe.phase {
            PipePhase::Pending => {}
            PipePhase::Connected => return SendResult::InvalidParam,
            PipePhase::Closed => return SendResult::NoConnection,
        }

        pipe.phase = PipePhase::Connected;
        pipe.to_client.push_back(ClientEvent::Connected(
            PeerInfo::new(pipe.host).with_status(ConnectionStatus::Connected),
        ));
        let (host, client) = (pipe.host, pipe.client);
        let info = PeerInfo::new(client).with_status(ConnectionStatus::Connected);
        self.push_host(host, HostEvent::Connected { id, info });
        SendResult::Ok
    }

    fn host_send(&mut self, id: ConnectionId, frame: &[u8]) -> SendResult {
        if frame.len() > LOOPBACK_MAX_MESSAGE {
            return SendResult::InvalidParam;
        }
        match self.pipes.get_mut(&id) {
            Some(pipe) if pipe.phase == PipePhase::Connected => {
                pipe.to_client.push_back(ClientEvent::Message(frame.to_vec()));
                SendResult::Ok
            }
            _ => SendResult::NoConnection,
        }
    }

    fn client_send(&mut self, id: ConnectionId, frame: &[u8]) -> SendResult {
        if frame.len() > LOOPBACK_MAX_MESSAGE {
            return SendResult::InvalidParam;
        }
        let host = match self.pipes.get(&id) {
            Some(pipe) if pipe.phase == PipePhase::Connected => pipe.host,
            _ => return SendResult::NoConnection,
        };
        if !self.listeners.contains_key(&host) {
            return SendResult::NoConnection;
        }
        self.push_host(
            host,
            HostEvent::Message {
                id,
                data: frame.to_vec(),
            },
        );
        SendResult::Ok
    }

    fn host_close(&mut self, id: ConnectionId) -> bool {
        let Some(pipe) = self.pipes.get_mut(&id) else {
            return false;
        };
        if pipe.phase != PipePhase::Closed {
            pipe.phase = PipePhase::Closed;
            pipe.to_client.push_back(ClientEvent::Disconnected(
                PeerInfo::new(pipe.host)
                    .with_status(ConnectionStatus::ClosedByPeer)
                    .with_end_reason(EndReason::AppClosed),
            ));
        }
        pipe.host_released = true;
        self.release(id);
        true
    }

    fn client_close(&mut self, id: ConnectionId) {
        let Some(pipe) = self.pipes.get_mut(&id) else {
            return;
        };
        let notify = pipe.phase != PipePhase::Closed;
        pipe.phase = PipePhase::Closed;
        pipe.client_released = true;
        pipe.to_client.clear();
        let (host, client) = (pipe.host, pipe.client);

        if notify {
            let info = PeerInfo::new(client)
                .with_status(ConnectionStatus::ClosedByPeer)
                .with_end_reason(EndReason::AppClosed);
            self.push_host(host, HostEvent::Disconnected { id, info });
        }
        self.release(id);
    }

    fn sever(&mut self, id: ConnectionId, reason: EndReason) -> bool {
        let Some(pipe) = self.pipes.get_mut(&id) else {
            return false;
        };
        if pipe.phase == PipePhase::Closed {
            return false;
        }
        pipe.phase = PipePhase::Closed;
        pipe.to_client.push_back(ClientEvent::Disconnected(
            PeerInfo::new(pipe.host)
                .with_status(ConnectionStatus::ProblemDetectedLocally)
                .with_end_reason(reason),
        ));
        let (host, client) = (pipe.host, pipe.client);
        let info = PeerInfo::new(client)
            .with_status(ConnectionStatus::ProblemDetectedLocally)
            .with_end_reason(reason);
        self.push_host(host, HostEvent::Disconnected { id, info });
        true
    }

    fn close_listener(&mut self, host: PeerId) {
        if self.listeners.remove(&host).is_none() {
            return;
        }
        for pipe in self.pipes.values_mut().filter(|p| p.host == host) {
            pipe.host_released = true;
            if pipe.phase != PipePhase::Closed {
                pipe.phase = PipePhase::Closed;
                pipe.to_client.push_back(ClientEvent::Disconnected(
                    PeerInfo::new(host)
                        .with_status(ConnectionStatus::ClosedByPeer)
                        .with_end_reason(EndReason::AppClosed),
                ));
            }
        }
        self.pipes
            .retain(|_, p| !(p.host_released && p.client_released));
    }

    fn release(&mut self, id: ConnectionId) {
        if self
            .pipes
            .get(&id)
            .is_some_and(|p| p.host_released && p.client_released)
        {
            self.pipes.remove(&id);
        }
    }
}

/// Shared in-process relay network. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LoopbackNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl Default for LoopbackNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackNetwork {
    /// Create an empty network.
    pub fn new() -> Self {
        Self {
            hub: Arc::new(Mutex::new(Hub::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Listen for relay connections addressed to `host`.
    pub fn listen(&self, host: PeerId) -> LoopbackSocket {
        let mut hub = self.lock();
        if hub.listeners.insert(host, VecDeque::new()).is_some() {
            warn!(%host, "loopback: replacing existing listener");
        }
        LoopbackSocket {
            network: self.clone(),
            host,
            closed: false,
        }
    }

    /// Client stack for the peer `local`.
    pub fn client(&self, local: PeerId) -> LoopbackClient {
        LoopbackClient {
            network: self.clone(),
            local,
        }
    }

    /// Drop a connection from the relay side, notifying both ends with `reason`.
    ///
    /// Returns `false` if the connection is unknown or already closed.
    pub fn sever(&self, id: ConnectionId, reason: EndReason) -> bool {
        self.lock().sever(id, reason)
    }

    /// Invalidate the relay stack; every socket and client reports invalid.
    pub fn shutdown(&self) {
        self.lock().valid = false;
    }

    /// Whether the relay stack is usable.
    pub fn is_valid(&self) -> bool {
        self.lock().valid
    }

    /// Number of connections that are pending or connected.
    pub fn open_connections(&self) -> usize {
        self.lock()
            .pipes
            .values()
            .filter(|p| p.phase != PipePhase::Closed)
            .count()
    }
}

/// Listening socket of a loopback host.
#[derive(Debug)]
pub struct LoopbackSocket {
    network: LoopbackNetwork,
    host: PeerId,
    closed: bool,
}

impl LoopbackSocket {
    /// Identity the socket listens under.
    pub fn host(&self) -> PeerId {
        self.host
    }
}

impl RelaySocket for LoopbackSocket {
    type Connection = LoopbackConnection;

    fn is_valid(&self) -> bool {
        !self.closed && self.network.is_valid()
    }

    fn receive(&mut self, events: &mut Vec<SocketEvent<LoopbackConnection>>) {
        if self.closed {
            return;
        }
        let pending: Vec<HostEvent> = {
            let mut hub = self.network.lock();
            match hub.listeners.get_mut(&self.host) {
                Some(queue) => queue.drain(..).collect(),
                None => return,
            }
        };

        events.extend(pending.into_iter().map(|event| match event {
            HostEvent::Connecting { id, info } => SocketEvent::Connecting {
                connection: LoopbackConnection {
                    network: self.network.clone(),
                    id,
                },
                info,
            },
            HostEvent::Connected { id, info } => SocketEvent::Connected { id, info },
            HostEvent::Disconnected { id, info } => SocketEvent::Disconnected { id, info },
            HostEvent::Message { id, data } => SocketEvent::Message { id, data },
        }));
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.network.lock().close_listener(self.host);
        }
    }
}

impl Drop for LoopbackSocket {
    fn drop(&mut self) {
        self.close();
    }
}

/// Host-side handle of one loopback connection.
///
/// The network tracks the connection until both ends have released it. The
/// host end is released by [`close`](RelayConnection::close) or by closing
/// the listening socket; dropping a handle does neither, so an unclosed
/// handle keeps its entry alive until the listener goes away. Identities are
/// never reused within one network.
#[derive(Debug, Clone)]
pub struct LoopbackConnection {
    network: LoopbackNetwork,
    id: ConnectionId,
}

impl RelayConnection for LoopbackConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn accept(&mut self) -> SendResult {
        self.network.lock().accept(self.id)
    }

    fn send(&mut self, frame: &[u8], _mode: SendMode) -> SendResult {
        self.network.lock().host_send(self.id, frame)
    }

    fn close(&mut self) -> bool {
        self.network.lock().host_close(self.id)
    }
}

/// Client stack of a loopback peer.
#[derive(Debug, Clone)]
pub struct LoopbackClient {
    network: LoopbackNetwork,
    local: PeerId,
}

impl LoopbackClient {
    /// Identity of this peer.
    pub fn local(&self) -> PeerId {
        self.local
    }
}

impl RelayClient for LoopbackClient {
    type Connection = LoopbackClientConnection;

    fn is_valid(&self) -> bool {
        self.network.is_valid()
    }

    fn connect(&mut self, host: PeerId) -> LoopbackClientConnection {
        let id = self.network.lock().connect(self.local, host);
        LoopbackClientConnection {
            network: self.network.clone(),
            id,
        }
    }
}

/// Client-side handle of one loopback connection.
#[derive(Debug)]
pub struct LoopbackClientConnection {
    network: LoopbackNetwork,
    id: ConnectionId,
}

impl RelayClientConnection for LoopbackClientConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn receive(&mut self, events: &mut Vec<ClientEvent>) {
        let mut hub = self.network.lock();
        if let Some(pipe) = hub.pipes.get_mut(&self.id) {
            events.extend(pipe.to_client.drain(..));
        }
    }

    fn send(&mut self, frame: &[u8], _mode: SendMode) -> SendResult {
        self.network.lock().client_send(self.id, frame)
    }

    fn close(&mut self, _linger: bool) {
        // Delivery is immediate, so lingering has nothing left to flush.
        self.network.lock().client_close(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: PeerId = PeerId::new(100);
    const GUEST: PeerId = PeerId::new(200);

    fn pump_host(socket: &mut LoopbackSocket) -> Vec<SocketEvent<LoopbackConnection>> {
        let mut events = Vec::new();
        socket.receive(&mut events);
        events
    }

    fn pump_client(conn: &mut LoopbackClientConnection) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        conn.receive(&mut events);
        events
    }

    fn accepted_pair(
        net: &LoopbackNetwork,
    ) -> (LoopbackSocket, LoopbackConnection, LoopbackClientConnection) {
        let mut socket = net.listen(HOST);
        let mut client_conn = net.client(GUEST).connect(HOST);

        let mut events = pump_host(&mut socket);
        let Some(SocketEvent::Connecting { mut connection, .. }) = events.pop() else {
            panic!("expected connecting event");
        };
        assert!(connection.accept().is_ok());
        pump_host(&mut socket);
        pump_client(&mut client_conn);
        (socket, connection, client_conn)
    }

    #[test]
    fn test_connect_and_accept() {
        let net = LoopbackNetwork::new();
        let mut socket = net.listen(HOST);
        let mut client_conn = net.client(GUEST).connect(HOST);

        let mut events = pump_host(&mut socket);
        assert_eq!(events.len(), 1);
        let SocketEvent::Connecting { mut connection, info } = events.remove(0) else {
            panic!("expected connecting event");
        };
        assert_eq!(info.peer, GUEST);
        assert_eq!(connection.id(), client_conn.id());

        assert_eq!(connection.accept(), SendResult::Ok);
        assert_eq!(connection.accept(), SendResult::InvalidParam);

        let events = pump_host(&mut socket);
        assert!(matches!(events[0], SocketEvent::Connected { .. }));

        let events = pump_client(&mut client_conn);
        assert!(matches!(events[0], ClientEvent::Connecting(_)));
        assert!(matches!(events[1], ClientEvent::Connected(_)));
        assert_eq!(net.open_connections(), 1);
    }

    #[test]
    fn test_messages_flow_both_ways() {
        let net = LoopbackNetwork::new();
        let (mut socket, mut host_conn, mut client_conn) = accepted_pair(&net);

        assert!(client_conn.send(b"ping", SendMode::Unreliable).is_ok());
        let events = pump_host(&mut socket);
        let SocketEvent::Message { id, data } = &events[0] else {
            panic!("expected message");
        };
        assert_eq!(*id, host_conn.id());
        assert_eq!(data, b"ping");

        assert!(host_conn.send(b"pong", SendMode::Unreliable).is_ok());
        assert_eq!(
            pump_client(&mut client_conn),
            vec![ClientEvent::Message(b"pong".to_vec())]
        );
    }

    #[test]
    fn test_send_before_accept_fails() {
        let net = LoopbackNetwork::new();
        let _socket = net.listen(HOST);
        let mut client_conn = net.client(GUEST).connect(HOST);
        assert_eq!(
            client_conn.send(b"early", SendMode::Unreliable),
            SendResult::NoConnection
        );
    }

    #[test]
    fn test_oversized_message_rejected() {
        let net = LoopbackNetwork::new();
        let (_socket, mut host_conn, _client_conn) = accepted_pair(&net);
        let big = vec![0u8; LOOPBACK_MAX_MESSAGE + 1];
        assert_eq!(host_conn.send(&big, SendMode::Reliable), SendResult::InvalidParam);
    }

    #[test]
    fn test_host_close_is_graceful_for_client() {
        let net = LoopbackNetwork::new();
        let (_socket, mut host_conn, mut client_conn) = accepted_pair(&net);

        assert!(host_conn.close());
        let events = pump_client(&mut client_conn);
        let ClientEvent::Disconnected(info) = &events[0] else {
            panic!("expected disconnect");
        };
        assert!(info.end_reason.is_graceful());
        assert_eq!(net.open_connections(), 0);
    }

    #[test]
    fn test_client_close_notifies_host() {
        let net = LoopbackNetwork::new();
        let (mut socket, mut host_conn, mut client_conn) = accepted_pair(&net);

        client_conn.close(true);
        let events = pump_host(&mut socket);
        let SocketEvent::Disconnected { id, info } = &events[0] else {
            panic!("expected disconnect");
        };
        assert_eq!(*id, host_conn.id());
        assert_eq!(info.end_reason, EndReason::AppClosed);

        // Host releases its handle afterwards; the pipe is gone.
        assert!(host_conn.close());
        assert!(!host_conn.close());
    }

    #[test]
    fn test_sever_reports_reason_to_both_sides() {
        let net = LoopbackNetwork::new();
        let (mut socket, host_conn, mut client_conn) = accepted_pair(&net);

        assert!(net.sever(host_conn.id(), EndReason::Timeout));
        assert!(!net.sever(host_conn.id(), EndReason::Timeout));

        let host_events = pump_host(&mut socket);
        assert!(matches!(
            &host_events[0],
            SocketEvent::Disconnected { info, .. } if info.end_reason == EndReason::Timeout
        ));
        let client_events = pump_client(&mut client_conn);
        assert!(matches!(
            &client_events[0],
            ClientEvent::Disconnected(info) if info.end_reason == EndReason::Timeout
        ));
    }

    #[test]
    fn test_connect_to_unknown_host_times_out() {
        let net = LoopbackNetwork::new();
        let mut client_conn = net.client(GUEST).connect(PeerId::new(999));
        let events = pump_client(&mut client_conn);
        assert!(matches!(
            events.last(),
            Some(ClientEvent::Disconnected(info)) if info.end_reason == EndReason::Timeout
        ));
    }

    #[test]
    fn test_listener_close_disconnects_clients() {
        let net = LoopbackNetwork::new();
        let (mut socket, _host_conn, mut client_conn) = accepted_pair(&net);

        socket.close();
        assert!(!socket.is_valid());
        let events = pump_client(&mut client_conn);
        assert!(matches!(
            &events[0],
            ClientEvent::Disconnected(info) if info.end_reason.is_graceful()
        ));
    }

    #[test]
    fn test_unclosed_handle_released_with_listener() {
        let net = LoopbackNetwork::new();
        let (mut socket, host_conn, mut client_conn) = accepted_pair(&net);
        drop(host_conn);

        client_conn.close(false);
        assert_eq!(net.open_connections(), 0);
        assert_eq!(net.lock().pipes.len(), 1);

        socket.close();
        assert!(net.lock().pipes.is_empty());
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let net = LoopbackNetwork::new();
        let mut socket = net.listen(HOST);
        let mut client = net.client(GUEST);
        let _first = client.connect(HOST);
        let _second = client.connect(HOST);

        let ids: Vec<ConnectionId> = pump_host(&mut socket)
            .iter()
            .filter_map(|event| match event {
                SocketEvent::Connecting { connection, .. } => Some(connection.id()),
                _ => None,
            })
            .collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_shutdown_invalidates_stack() {
        let net = LoopbackNetwork::new();
        let socket = net.listen(HOST);
        let client = net.client(GUEST);
        assert!(socket.is_valid());
        assert!(client.is_valid());

        net.shutdown();
        assert!(!socket.is_valid());
        assert!(!client.is_valid());
    }
}
