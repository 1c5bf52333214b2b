//! Error types shared across the bridge.

use std::io;

use thiserror::Error;

use super::types::ConnectionId;

/// Framing errors.
///
/// A frame that fails framing is dropped and logged; the session it belongs
/// to is unaffected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Frame is shorter than the header.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum expected size.
        expected: usize,
        /// Actual size received.
        actual: usize,
    },

    /// Frame would not fit the datagram MTU.
    #[error("frame of {size} bytes exceeds MTU of {mtu} bytes")]
    ExceedsMtu {
        /// Encoded frame size.
        size: usize,
        /// Maximum frame size.
        mtu: usize,
    },
}

/// Errors from a datagram link to the server.
#[derive(Debug, Error)]
pub enum LinkError {
    /// I/O error on the underlying socket.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The server endpoint rejected or dropped the link.
    #[error("link disconnected: {0}")]
    Disconnected(String),

    /// The link has been closed.
    #[error("link closed")]
    Closed,

    /// The socket would block; the datagram was not sent.
    #[error("send would block")]
    WouldBlock,

    /// Fewer bytes were written than requested.
    #[error("datagram truncated: sent {sent} of {len} bytes")]
    Truncated {
        /// Bytes written.
        sent: usize,
        /// Bytes requested.
        len: usize,
    },

    /// The listener has no gateway configured.
    #[error("no datagram gateway configured")]
    Unsupported,
}

impl LinkError {
    /// Whether the link can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LinkError::Disconnected(_) | LinkError::Closed | LinkError::Unsupported
        )
    }
}

/// Session table errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// A session with this identity is already present.
    #[error("duplicate connection identity: {0}")]
    DuplicateIdentity(ConnectionId),

    /// No session with this identity.
    #[error("connection identity not found: {0}")]
    NotFound(ConnectionId),
}
