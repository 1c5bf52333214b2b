//! Identities and connection metadata reported by the relay.

use std::fmt;
use std::net::SocketAddr;

/// Handle of one relay connection.
///
/// Stable for the lifetime of the connection and unique among the
/// connections a relay socket currently has open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u32);

impl ConnectionId {
    /// Create a connection ID from its raw value.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ConnectionId {
    fn from(raw: u32) -> Self {
        Self::new(raw)
    }
}

/// Identity of a peer on the relay network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl PeerId {
    /// Create a peer ID from its raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Diagnostic label used in logs (`#<id>`).
    pub fn label(self) -> String {
        format!("#{}", self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PeerId {
    fn from(raw: u64) -> Self {
        Self::new(raw)
    }
}

/// Connection status as reported by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// No connection.
    #[default]
    None,
    /// Connection attempt in progress.
    Connecting,
    /// Looking for a relay route.
    FindingRoute,
    /// Connected.
    Connected,
    /// The remote end closed the connection.
    ClosedByPeer,
    /// A problem was detected locally (timeout, route loss).
    ProblemDetectedLocally,
}

/// Why the relay ended a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndReason {
    /// Connection has not ended.
    #[default]
    None,
    /// The remote application closed the connection on purpose.
    AppClosed,
    /// Unspecified failure.
    Generic,
    /// Internal error in the relay library.
    InternalError,
    /// The connection timed out.
    Timeout,
    /// Any other relay-specific code.
    ///
    /// Holds codes without a named variant. [`from_code`](Self::from_code)
    /// never produces `Other` for a named code; use
    /// [`normalized`](Self::normalized) on hand-built values.
    Other(i32),
}

impl EndReason {
    /// Code for an application-initiated close.
    pub const APP_CLOSED_CODE: i32 = 1000;
    /// Code for a generic failure.
    pub const GENERIC_CODE: i32 = 5001;
    /// Code for an internal relay error.
    pub const INTERNAL_ERROR_CODE: i32 = 5002;
    /// Code for a timeout.
    pub const TIMEOUT_CODE: i32 = 5003;

    /// Map a raw relay code to a reason.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::None,
            Self::APP_CLOSED_CODE => Self::AppClosed,
            Self::GENERIC_CODE => Self::Generic,
            Self::INTERNAL_ERROR_CODE => Self::InternalError,
            Self::TIMEOUT_CODE => Self::Timeout,
            other => Self::Other(other),
        }
    }

    /// Raw relay code.
    pub fn code(self) -> i32 {
        match self {
            Self::None => 0,
            Self::AppClosed => Self::APP_CLOSED_CODE,
            Self::Generic => Self::GENERIC_CODE,
            Self::InternalError => Self::INTERNAL_ERROR_CODE,
            Self::Timeout => Self::TIMEOUT_CODE,
            Self::Other(code) => code,
        }
    }

    /// Replace an `Other` holding a named code with the named variant.
    pub fn normalized(self) -> Self {
        Self::from_code(self.code())
    }

    /// Whether the remote ended the session intentionally.
    pub fn is_graceful(self) -> bool {
        self.code() == Self::APP_CLOSED_CODE
    }

    /// Human-readable description.
    pub fn description(self) -> String {
        match self {
            Self::None => "None".to_string(),
            Self::AppClosed => "Host Disconnected".to_string(),
            Self::Generic => "Generic Connection Error".to_string(),
            Self::InternalError => "Internal Timeout".to_string(),
            Self::Timeout => "Timeout".to_string(),
            Self::Other(code) => format!("End reason {code}"),
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

/// Connection metadata delivered with every relay lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Remote peer identity.
    pub peer: PeerId,
    /// Connection status at the time of the event.
    pub status: ConnectionStatus,
    /// End reason (only meaningful on disconnect).
    pub end_reason: EndReason,
    /// Remote address, when the relay exposes it.
    pub address: Option<SocketAddr>,
}

impl PeerInfo {
    /// Create peer info with no status and no end reason.
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            status: ConnectionStatus::None,
            end_reason: EndReason::None,
            address: None,
        }
    }

    /// Set the status.
    pub fn with_status(mut self, status: ConnectionStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the end reason.
    pub fn with_end_reason(mut self, end_reason: EndReason) -> Self {
        self.end_reason = end_reason;
        self
    }

    /// Set the remote address.
    pub fn with_address(mut self, address: SocketAddr) -> Self {
        self.address = Some(address);
        self
    }
}

impl fmt::Display for PeerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} EndReason: {} Identity: {}",
            self.status,
            self.end_reason,
            self.peer.label()
        )?;
        if let Some(address) = self.address {
            write!(f, " Address: {address}")?;
        }
        Ok(())
    }
}

/// Delivery hint for relay sends.
///
/// Both modes disable send coalescing; pacing is the application's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendMode {
    /// Best-effort delivery for regular traffic.
    #[default]
    Unreliable,
    /// Guaranteed delivery, used for the final disconnect notice.
    Reliable,
}

/// Result of a relay send or accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum SendResult {
    /// Accepted by the relay.
    Ok,
    /// The connection is gone.
    NoConnection,
    /// Send buffer or rate limit exceeded.
    LimitExceeded,
    /// Bad argument (e.g. message too large).
    InvalidParam,
    /// Other failure.
    Failed,
}

impl SendResult {
    /// Whether the relay accepted the call.
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl fmt::Display for SendResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
