//! Core identities, constants, errors, and the relay collaborator traits.
//!
//! Everything here is independent of a concrete relay library or socket.

mod constants;
mod error;
mod traits;
mod types;

pub use constants::*;
pub use error::*;
pub use traits::*;
pub use types::*;
