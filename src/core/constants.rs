//! Bridge constants.
//!
//! All sizes are in bytes.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

// =============================================================================
// FRAMING
// =============================================================================

/// Size of the bridge frame header.
///
/// Equal to the per-datagram header the server's datagram transport adds, so a
/// payload re-encapsulated on the server side never exceeds its own limit.
pub const HEADER_SIZE: usize = 8;

/// Frame format version written into every header.
pub const FRAME_VERSION: u8 = 1;

/// Default maximum frame size on the datagram link.
pub const DEFAULT_DATAGRAM_MTU: usize = 1200;

/// Largest payload that fits in a default-sized frame.
pub const DEFAULT_MAX_PAYLOAD: usize = DEFAULT_DATAGRAM_MTU - HEADER_SIZE;

/// Largest UDP payload over IPv4.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

// =============================================================================
// SESSIONS
// =============================================================================

/// Default bound on a session's inbound queue before the oldest frame is evicted.
pub const DEFAULT_INBOUND_QUEUE_CAPACITY: usize = 1024;

/// Upper bound on datagrams pulled from a link in one poll.
pub const MAX_DATAGRAMS_PER_POLL: usize = 256;

// =============================================================================
// TICK
// =============================================================================

/// Default tick rate (ticks per second).
pub const DEFAULT_TICK_RATE_HZ: u32 = 30;

/// Highest accepted tick rate.
pub const MAX_TICK_RATE_HZ: u32 = 1000;

// =============================================================================
// SERVER ENDPOINT
// =============================================================================

/// Default UDP port of the local game server.
pub const DEFAULT_SERVER_PORT: u16 = 32001;

/// Default local game server endpoint (`127.0.0.1:32001`).
pub const DEFAULT_SERVER_ENDPOINT: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_SERVER_PORT);
