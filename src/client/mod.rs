//! Join side of the bridge.
//!
//! [`ClientBridgeTransport`] implements the generic
//! [`Transport`](crate::transport::Transport) contract over a relay client
//! connection, so the application joins a relayed host exactly as it would
//! join a server directly. [`RelayTransportFactory`] hands out fresh
//! transports for each join attempt.

mod factory;
mod transport;

pub use factory::*;
pub use transport::*;
