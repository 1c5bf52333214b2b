//! UDP datagram link to the local server.
//!
//! Each link owns a socket bound to an ephemeral local port and connected to
//! the server endpoint, so the server sees one client address per relay
//! session. The socket is non-blocking: the tick model never waits on I/O.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use tracing::debug;

use crate::core::{
    DatagramLink, LinkError, LinkFactory, LinkState, MAX_DATAGRAMS_PER_POLL, MAX_UDP_PAYLOAD,
};

/// Default receive buffer size.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 65535;

/// Non-blocking UDP link connected to one server endpoint.
#[derive(Debug)]
pub struct UdpLink {
    /// The socket; `None` once closed.
    socket: Option<UdpSocket>,
    /// Server endpoint.
    endpoint: SocketAddr,
    /// Local address (kept after close for diagnostics).
    local_addr: SocketAddr,
    /// Receive buffer.
    recv_buffer: Vec<u8>,
    /// Upper bound on datagrams returned by one `receive`.
    max_datagrams_per_poll: usize,
}

impl UdpLink {
    /// Open a link to `endpoint` with default options.
    pub fn connect(endpoint: SocketAddr) -> Result<Self, LinkError> {
        UdpLinkBuilder::new().connect(endpoint)
    }

    /// Server endpoint.
    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// Local address of the link.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn map_recv_error(error: io::Error) -> LinkError {
        match error.kind() {
            io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => {
                LinkError::Disconnected(error.to_string())
            }
            _ => LinkError::Io(error),
        }
    }
}

impl DatagramLink for UdpLink {
    fn state(&self) -> LinkState {
        if self.socket.is_some() {
            LinkState::Open
        } else {
            LinkState::Closed
        }
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        let socket = self.socket.as_ref().ok_or(LinkError::Closed)?;
        match socket.send(payload) {
            Ok(sent) if sent == payload.len() => Ok(()),
            Ok(sent) => Err(LinkError::Truncated {
                sent,
                len: payload.len(),
            }),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(LinkError::WouldBlock),
            Err(e) => Err(LinkError::Io(e)),
        }
    }

    fn receive(&mut self, out: &mut Vec<Vec<u8>>) -> Result<usize, LinkError> {
        let socket = self.socket.as_ref().ok_or(LinkError::Closed)?;

        let mut count = 0;
        while count < self.max_datagrams_per_poll {
            match socket.recv(&mut self.recv_buffer) {
                Ok(len) => {
                    out.push(self.recv_buffer[..len].to_vec());
                    count += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let error = Self::map_recv_error(e);
                    if error.is_fatal() {
                        self.socket = None;
                    }
                    return Err(error);
                }
            }
        }
        Ok(count)
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!(local = %self.local_addr, endpoint = %self.endpoint, "udp link closed");
        }
    }
}

/// Builder for UDP links with custom options.
#[derive(Debug, Clone)]
pub struct UdpLinkBuilder {
    recv_buffer_size: usize,
    max_datagrams_per_poll: usize,
}

impl Default for UdpLinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl UdpLinkBuilder {
    /// Create a builder with default options.
    pub fn new() -> Self {
        Self {
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            max_datagrams_per_poll: MAX_DATAGRAMS_PER_POLL,
        }
    }

    /// Set the receive buffer size (clamped to at least one byte).
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size.clamp(1, MAX_UDP_PAYLOAD);
        self
    }

    /// Set the maximum datagrams returned per `receive`.
    pub fn max_datagrams_per_poll(mut self, max: usize) -> Self {
        self.max_datagrams_per_poll = max.max(1);
        self
    }

    /// Bind an ephemeral socket and connect it to `endpoint`.
    pub fn connect(&self, endpoint: SocketAddr) -> Result<UdpLink, LinkError> {
        let bind_ip = match endpoint.ip() {
            IpAddr::V4(ip) if ip.is_loopback() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(ip) if ip.is_loopback() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };

        let socket = UdpSocket::bind(SocketAddr::new(bind_ip, 0))?;
        socket.connect(endpoint)?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        debug!(local = %local_addr, endpoint = %endpoint, "udp link opened");

        Ok(UdpLink {
            socket: Some(socket),
            endpoint,
            local_addr,
            recv_buffer: vec![0u8; self.recv_buffer_size],
            max_datagrams_per_poll: self.max_datagrams_per_poll,
        })
    }
}

/// Opens one [`UdpLink`] per session.
#[derive(Debug, Clone, Default)]
pub struct UdpLinkFactory {
    builder: UdpLinkBuilder,
}

impl UdpLinkFactory {
    /// Factory with default link options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory using the given builder.
    pub fn with_builder(builder: UdpLinkBuilder) -> Self {
        Self { builder }
    }
}

impl LinkFactory for UdpLinkFactory {
    type Link = UdpLink;

    fn open(&mut self, endpoint: SocketAddr) -> Result<UdpLink, LinkError> {
        self.builder.connect(endpoint)
    }
}
