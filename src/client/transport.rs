//! Relay-backed client transport.

use std::collections::VecDeque;
use std::mem;
use std::net::SocketAddr;

use tracing::{debug, error, info, warn};

use crate::core::{
    ClientEvent, ConnectionId, HEADER_SIZE, PeerId, RelayClient, RelayClientConnection, SendMode,
};
use crate::transport::{
    ConnectionSettings, FrameFlags, PacketFramer, Transport, TransportError, TransportEvent,
    TransportResult, TransportState,
};

/// Client transport counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Frames accepted by the relay.
    pub frames_sent: u64,
    /// Payloads handed to the application.
    pub frames_received: u64,
    /// Relay sends that were not accepted.
    pub send_failures: u64,
    /// Frames dropped because they failed to encode or decode.
    pub framing_errors: u64,
}

/// [`Transport`] over one outbound relay connection to a host peer.
///
/// The `endpoint` given to [`open`](Transport::open) is only logged: the
/// relay routes by the host's [`PeerId`].
pub struct ClientBridgeTransport<C: RelayClient> {
    client: C,
    host: PeerId,
    connection: Option<C::Connection>,
    state: TransportState,
    /// Set by `prepare_disconnect`; selects the reliable hint.
    closing: bool,
    /// Whether a `NotInitialized` event is outstanding.
    invalid_reported: bool,
    framer: PacketFramer,
    scratch: Vec<u8>,
    pump: Vec<ClientEvent>,
    events: VecDeque<TransportEvent>,
    stats: TransportStats,
}

impl<C: RelayClient> ClientBridgeTransport<C> {
    /// Create an unopened transport that will connect to `host`.
    pub fn new(client: C, host: PeerId) -> Self {
        Self {
            client,
            host,
            connection: None,
            state: TransportState::Opening,
            closing: false,
            invalid_reported: false,
            framer: PacketFramer::default(),
            scratch: Vec::new(),
            pump: Vec::new(),
            events: VecDeque::new(),
            stats: TransportStats::default(),
        }
    }

    /// Host peer this transport joins.
    pub fn host(&self) -> PeerId {
        self.host
    }

    /// Identity of the relay connection, once opened.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection.as_ref().map(|c| c.id())
    }

    /// Whether `prepare_disconnect` was called.
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Counters.
    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    fn dispatch(&mut self, event: ClientEvent, buffer: &mut Vec<Vec<u8>>) -> usize {
        match event {
            ClientEvent::Connecting(info) => {
                debug!(host = %self.host, status = ?info.status, "relay connecting");
            }
            ClientEvent::Connected(info) => {
                if self.state == TransportState::Opening {
                    self.state = TransportState::Open;
                }
                info!(host = %info.peer.label(), "relay connected");
            }
            ClientEvent::Disconnected(info) => {
                let error = TransportError::from_disconnect(info.end_reason, info.to_string());
                if error.is_graceful() {
                    info!(host = %self.host, "host closed the connection");
                } else {
                    warn!(host = %self.host, error = %error, "relay connection lost");
                }
                self.events.push_back(TransportEvent::Error(error));
            }
            ClientEvent::Message(frame) => match self.framer.decode(&frame) {
                Ok(payload) => {
                    buffer.push(payload.to_vec());
                    self.stats.frames_received += 1;
                    return 1;
                }
                Err(e) => {
                    self.stats.framing_errors += 1;
                    warn!(host = %self.host, error = %e, "dropping undecodable frame");
                }
            },
        }
        0
    }
}

impl<C: RelayClient> Transport for ClientBridgeTransport<C> {
    fn state(&self) -> TransportState {
        self.state
    }

    fn header_size(&self) -> usize {
        HEADER_SIZE
    }

    fn is_reliable(&self) -> bool {
        false
    }

    fn description(&self) -> &str {
        "relay"
    }

    fn open(&mut self, endpoint: SocketAddr, settings: &ConnectionSettings) -> TransportResult<()> {
        if self.state == TransportState::Closed {
            return Err(TransportError::ConnectionClosed);
        }
        if self.connection.is_some() {
            return Err(TransportError::AlreadyOpen);
        }
        if !self.client.is_valid() {
            return Err(TransportError::NotInitialized);
        }

        self.framer = PacketFramer::new(settings.max_frame_size);
        let connection = self.client.connect(self.host);
        info!(
            host = %self.host,
            %endpoint,
            id = %connection.id(),
            "opening relay connection"
        );
        self.connection = Some(connection);
        self.events.push_back(TransportEvent::Opened);
        Ok(())
    }

    fn prepare_disconnect(&mut self) {
        debug!(host = %self.host, "preparing disconnect");
        self.closing = true;
    }

    fn send(&mut self, payload: &[u8]) -> TransportResult<()> {
        if self.state == TransportState::Closed {
            return Err(TransportError::ConnectionClosed);
        }
        let Some(connection) = self.connection.as_mut() else {
            return Err(TransportError::NotOpen);
        };

        let (flags, mode) = if self.closing {
            (FrameFlags::FINAL, SendMode::Reliable)
        } else {
            (FrameFlags::NONE, SendMode::Unreliable)
        };

        if let Err(e) = self.framer.encode_into(payload, flags, &mut self.scratch) {
            self.stats.framing_errors += 1;
            error!(host = %self.host, error = %e, "dropping oversized payload");
            return Err(e.into());
        }

        let result = connection.send(&self.scratch, mode);
        if result.is_ok() {
            self.stats.frames_sent += 1;
        } else {
            self.stats.send_failures += 1;
            warn!(host = %self.host, %result, ?mode, "relay send failed");
        }
        Ok(())
    }

    fn receive(&mut self, buffer: &mut Vec<Vec<u8>>) -> usize {
        if self.state == TransportState::Closed {
            return 0;
        }
        if !self.client.is_valid() {
            if !self.invalid_reported {
                self.invalid_reported = true;
                self.events
                    .push_back(TransportEvent::Error(TransportError::NotInitialized));
            }
            return 0;
        }
        self.invalid_reported = false;

        let Some(connection) = self.connection.as_mut() else {
            return 0;
        };
        let mut pending = mem::take(&mut self.pump);
        connection.receive(&mut pending);

        let mut count = 0;
        for event in pending.drain(..) {
            count += self.dispatch(event, buffer);
        }
        self.pump = pending;
        count
    }

    fn close(&mut self) {
        if self.state == TransportState::Closed {
            warn!(host = %self.host, "transport already closed");
            return;
        }
        self.state = TransportState::Closed;
        if let Some(mut connection) = self.connection.take() {
            connection.close(true);
        }
        info!(host = %self.host, "relay transport closed");
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.events.pop_front()
    }
}

impl<C: RelayClient> Drop for ClientBridgeTransport<C> {
    fn drop(&mut self) {
        if self.state != TransportState::Closed {
            self.close();
        }
    }
}
