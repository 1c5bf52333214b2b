//! Transport layer shared by both halves of the bridge.
//!
//! - **Framing**: [`PacketFramer`] adds and strips the fixed bridge header
//! - **Contract**: the generic [`Transport`] the application joins through
//! - **Loopback relay**: [`LoopbackNetwork`], an in-process relay substrate
//! - **UDP link**: [`UdpLink`], the datagram link to the local server
//!
//! ```text
//! ┌──────────────┐  relay frames   ┌──────────────┐  UDP datagrams  ┌────────┐
//! │ client peer  │ ◄─────────────► │ relay bridge │ ◄─────────────► │ server │
//! └──────────────┘  (header + N)   └──────────────┘     (N bytes)   └────────┘
//! ```

mod contract;
mod error;
mod framing;
mod loopback;
mod udp;

pub use contract::*;
pub use error::*;
pub use framing::*;
pub use loopback::*;
pub use udp::*;
