//! Host side of the bridge.
//!
//! A [`RelayListener`] accepts relay connections, keeps one [`RelaySession`]
//! per connection in a [`SessionTable`], and forwards traffic each tick.
//! [`TickDriver`] runs the tick loop on a tokio task.

mod config;
mod driver;
mod listener;
mod session;
mod table;

#[cfg(test)]
mod mock;

pub use config::*;
pub use driver::*;
pub use listener::*;
pub use session::*;
pub use table::*;
