//! Per-connection relay sessions.
//!
//! A session pairs one accepted relay connection with, in gateway mode, one
//! datagram link to the local server. It handles:
//! - Session lifecycle (`Opening -> Open -> Closing -> Closed`)
//! - The bounded inbound queue filled by relay messages
//! - Forwarding in both directions once per tick

use std::collections::VecDeque;
use std::mem;
use std::net::SocketAddr;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::core::{
    ConnectionId, DEFAULT_INBOUND_QUEUE_CAPACITY, DatagramLink, FrameError, LinkError, LinkFactory,
    PeerId, RelayConnection, SendMode, SendResult,
};
use crate::transport::{FrameFlags, PacketFramer};

/// Errors that end or prevent a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The relay refused to accept the pending connection.
    #[error("relay accept failed: {0}")]
    Accept(SendResult),

    /// The datagram link to the server could not be opened.
    #[error("failed to open server link: {0}")]
    LinkOpen(#[source] LinkError),

    /// The datagram link reported an error.
    #[error("server link failed: {0}")]
    Link(#[source] LinkError),

    /// Too many relay sends failed in a row.
    #[error("{count} consecutive relay send failures")]
    SendFailures {
        /// Failures in the current run.
        count: u32,
    },

    /// A relay send was not accepted.
    #[error("relay send failed: {0}")]
    Send(SendResult),

    /// The payload could not be framed.
    #[error("framing failed: {0}")]
    Frame(#[from] FrameError),

    /// The session is not open.
    #[error("session not open ({0:?})")]
    NotOpen(SessionState),
}

impl SessionError {
    /// Whether this error happened while opening the session.
    pub fn is_open_error(&self) -> bool {
        matches!(self, SessionError::Accept(_) | SessionError::LinkOpen(_))
    }
}

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Created, not yet accepted.
    #[default]
    Opening,
    /// Accepted and forwarding.
    Open,
    /// Releasing resources.
    Closing,
    /// Terminal.
    Closed,
}

/// Per-session limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Inbound frames held before the oldest is evicted.
    pub inbound_queue_capacity: usize,
    /// Consecutive relay send failures that close the session (`None`: never).
    pub max_consecutive_send_failures: Option<u32>,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            inbound_queue_capacity: DEFAULT_INBOUND_QUEUE_CAPACITY,
            max_consecutive_send_failures: None,
        }
    }
}

/// Per-session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Payloads forwarded from the peer (to the link or the application).
    pub frames_from_peer: u64,
    /// Frames sent to the peer over the relay.
    pub frames_to_peer: u64,
    /// Frames dropped because they failed to encode or decode.
    pub framing_errors: u64,
    /// Inbound frames evicted from a full queue.
    pub evicted: u64,
    /// Relay sends that were not accepted.
    pub send_failures: u64,
    /// Current run of failed relay sends.
    pub consecutive_send_failures: u32,
    /// Link sends that failed.
    pub link_send_errors: u64,
}

/// A payload delivered to the application in relay mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    /// Connection the payload came from.
    pub id: ConnectionId,
    /// Decoded payload.
    pub payload: Vec<u8>,
}

/// One relay connection and its optional link to the server.
#[derive(Debug)]
pub struct RelaySession<C, L> {
    id: ConnectionId,
    peer_label: String,
    connection: C,
    link: Option<L>,
    inbound: VecDeque<Vec<u8>>,
    state: SessionState,
    framer: PacketFramer,
    policy: SessionPolicy,
    /// Encode buffer reused across ticks.
    scratch: Vec<u8>,
    /// Receive buffer for link payloads, reused across ticks.
    link_buffer: Vec<Vec<u8>>,
    stats: SessionStats,
}

impl<C: RelayConnection, L: DatagramLink> RelaySession<C, L> {
    /// Create a session for a pending connection from `peer`.
    pub fn new(connection: C, peer: PeerId, framer: PacketFramer, policy: SessionPolicy) -> Self {
        Self {
            id: connection.id(),
            peer_label: peer.label(),
            connection,
            link: None,
            inbound: VecDeque::new(),
            state: SessionState::Opening,
            framer,
            policy,
            scratch: Vec::with_capacity(framer.max_frame_size()),
            link_buffer: Vec::new(),
            stats: SessionStats::default(),
        }
    }

    /// Accept the connection and, when `endpoint` is given, open a link to it.
    ///
    /// On failure the session is closed and never reaches `Open`.
    pub fn open<F>(&mut self, factory: &mut F, endpoint: Option<SocketAddr>) -> Result<(), SessionError>
    where
        F: LinkFactory<Link = L>,
    {
        if self.state != SessionState::Opening {
            return Err(SessionError::NotOpen(self.state));
        }

        let result = self.connection.accept();
        if !result.is_ok() {
            self.close();
            return Err(SessionError::Accept(result));
        }

        if let Some(endpoint) = endpoint {
            match factory.open(endpoint) {
                Ok(link) => self.link = Some(link),
                Err(e) => {
                    self.close();
                    return Err(SessionError::LinkOpen(e));
                }
            }
        }

        self.state = SessionState::Open;
        info!(
            id = %self.id,
            peer = %self.peer_label,
            gateway = self.link.is_some(),
            "relay session open"
        );
        Ok(())
    }

    /// Queue a frame from the peer for the next drain.
    ///
    /// When the queue is full the oldest frame is evicted.
    pub fn enqueue_inbound(&mut self, frame: Vec<u8>) {
        if matches!(self.state, SessionState::Closing | SessionState::Closed) {
            debug!(id = %self.id, "frame for closed session dropped");
            return;
        }

        if self.inbound.len() >= self.policy.inbound_queue_capacity {
            self.inbound.pop_front();
            self.stats.evicted += 1;
            warn!(
                id = %self.id,
                peer = %self.peer_label,
                capacity = self.policy.inbound_queue_capacity,
                "inbound queue full, oldest frame evicted"
            );
        }
        self.inbound.push_back(frame);
    }

    /// Forward queued peer frames, then forward link payloads to the peer.
    ///
    /// Without a link, decoded peer payloads are appended to `delivered`.
    /// Returns an error when the session must be torn down.
    pub fn drain(&mut self, delivered: &mut Vec<Delivered>) -> Result<(), SessionError> {
        if self.state != SessionState::Open {
            return Ok(());
        }

        self.flush_inbound(delivered);

        let Some(link) = self.link.as_mut() else {
            return Ok(());
        };
        let mut payloads = mem::take(&mut self.link_buffer);
        if let Err(e) = link.receive(&mut payloads) {
            payloads.clear();
            self.link_buffer = payloads;
            return Err(SessionError::Link(e));
        }

        let mut result = Ok(());
        for payload in payloads.drain(..) {
            if let Err(e) = self.forward_to_peer(&payload) {
                result = Err(e);
                break;
            }
        }
        payloads.clear();
        self.link_buffer = payloads;
        result
    }

    /// Forward every queued peer frame to the link, or to `delivered` without one.
    ///
    /// Run before closing on a peer disconnect so its last frames are not lost.
    pub fn flush_inbound(&mut self, delivered: &mut Vec<Delivered>) {
        if self.state != SessionState::Open {
            return;
        }

        while let Some(frame) = self.inbound.pop_front() {
            let payload = match self.framer.decode(&frame) {
                Ok(payload) => payload,
                Err(e) => {
                    self.stats.framing_errors += 1;
                    error!(id = %self.id, error = %e, "dropping undecodable frame");
                    continue;
                }
            };

            match self.link.as_mut() {
                Some(link) => match link.send(payload) {
                    Ok(()) => self.stats.frames_from_peer += 1,
                    Err(e) => {
                        self.stats.link_send_errors += 1;
                        error!(id = %self.id, error = %e, "server link send failed");
                    }
                },
                None => {
                    self.stats.frames_from_peer += 1;
                    delivered.push(Delivered {
                        id: self.id,
                        payload: payload.to_vec(),
                    });
                }
            }
        }
    }

    /// Frame and send one payload to the peer.
    pub fn send_to_peer(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        if self.state != SessionState::Open {
            return Err(SessionError::NotOpen(self.state));
        }

        if let Err(e) = self.framer.encode_into(payload, FrameFlags::NONE, &mut self.scratch) {
            self.stats.framing_errors += 1;
            error!(id = %self.id, error = %e, "dropping oversized payload");
            return Err(e.into());
        }

        let result = self.connection.send(&self.scratch, SendMode::Unreliable);
        self.record_send(result)?;
        if result.is_ok() {
            Ok(())
        } else {
            Err(SessionError::Send(result))
        }
    }

    fn forward_to_peer(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        if let Err(e) = self.framer.encode_into(payload, FrameFlags::NONE, &mut self.scratch) {
            self.stats.framing_errors += 1;
            error!(id = %self.id, error = %e, "dropping oversized server payload");
            return Ok(());
        }
        let result = self.connection.send(&self.scratch, SendMode::Unreliable);
        self.record_send(result)
    }

    fn record_send(&mut self, result: SendResult) -> Result<(), SessionError> {
        if result.is_ok() {
            self.stats.frames_to_peer += 1;
            self.stats.consecutive_send_failures = 0;
            return Ok(());
        }

        self.stats.send_failures += 1;
        self.stats.consecutive_send_failures += 1;
        error!(
            id = %self.id,
            peer = %self.peer_label,
            result = %result,
            consecutive = self.stats.consecutive_send_failures,
            "relay send failed"
        );

        match self.policy.max_consecutive_send_failures {
            Some(max) if self.stats.consecutive_send_failures >= max => {
                Err(SessionError::SendFailures {
                    count: self.stats.consecutive_send_failures,
                })
            }
            _ => Ok(()),
        }
    }

    /// Close the link and the relay connection. Idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closing;

        if let Some(mut link) = self.link.take() {
            link.close();
        }
        if !self.connection.close() {
            warn!(id = %self.id, "relay connection close failed");
        }
        self.inbound.clear();

        self.state = SessionState::Closed;
        info!(id = %self.id, peer = %self.peer_label, "relay session closed");
    }
}

impl<C, L> RelaySession<C, L> {
    /// Connection identity.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Diagnostic label of the peer (`#<peer id>`).
    pub fn peer_label(&self) -> &str {
        &self.peer_label
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Check if the session is open.
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Whether the session owns a server link.
    pub fn has_link(&self) -> bool {
        self.link.is_some()
    }

    /// Frames waiting for the next drain.
    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    /// Counters.
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }
}
