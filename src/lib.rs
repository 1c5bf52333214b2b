//! # relay-bridge
//!
//! Bridges relayed peer connections onto a local datagram link.
//!
//! A host running a game server listens for relay connections (peer-to-peer,
//! NAT-traversing, identity-addressed). Each accepted connection becomes a
//! session that owns a UDP link to the server on the same machine, so the
//! server sees every remote player as an ordinary local UDP client. On the
//! joining side, the same relay is wrapped in the generic transport contract
//! the application already uses for direct connections.
//!
//! - **Framing**: every payload on the relay carries a fixed 8-byte header
//! - **Sessions**: one per relay connection, bounded inbound queue, explicit close
//! - **Polling**: single-threaded ticks; nothing blocks, nothing calls back
//!
//! ## Feature Flags
//!
//! - `transport` (default): framing, transport contract, loopback relay, UDP link
//! - `server` (default): relay listener, sessions, tokio tick driver
//! - `client` (default): relay-backed client transport and factory
//!
//! ## Modules
//!
//! - [`core`]: Identities, collaborator traits, constants and errors (always included)
//! - [`transport`]: Transport layer (requires `transport` feature)
//! - [`server`]: Host side (requires `server` feature)
//! - [`client`]: Join side (requires `client` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use relay_bridge::prelude::*;
//!
//! let network = LoopbackNetwork::new();
//! let host = PeerId::new(1);
//!
//! let mut listener = RelayListener::relay(network.listen(host), &ServerConfig::default()).unwrap();
//! let mut transport = ClientBridgeTransport::new(network.client(PeerId::new(2)), host);
//! transport
//!     .open(DEFAULT_SERVER_ENDPOINT, &ConnectionSettings::default())
//!     .unwrap();
//!
//! listener.tick().unwrap();
//! transport.receive(&mut Vec::new());
//! assert_eq!(transport.state(), TransportState::Open);
//!
//! transport.send(b"hello").unwrap();
//! let delivered = listener.tick().unwrap();
//! assert_eq!(delivered[0].payload, b"hello");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Transport layer (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Client API (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

// Server API (feature-gated)
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    // Transport types (when enabled)
    #[cfg(feature = "transport")]
    pub use crate::transport::{
        ConnectionSettings, FrameFlags, FrameHeader, LoopbackNetwork, PacketFramer, Transport,
        TransportError, TransportEvent, TransportFactory, TransportResult, TransportState,
        UdpLink, UdpLinkFactory,
    };

    // Client API (when enabled)
    #[cfg(feature = "client")]
    pub use crate::client::{
        ClientBridgeTransport, ClientConfig, ClientConfigBuilder, ClientError,
        RelayTransportFactory,
    };

    // Server API (when enabled)
    #[cfg(feature = "server")]
    pub use crate::server::{
        CloseReason, Delivered, ListenerEvent, RelayListener, RelaySession, ServerConfig,
        ServerConfigBuilder, ServerError, SessionError, SessionState, TickDriver,
    };
}
