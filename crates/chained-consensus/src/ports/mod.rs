//! Ports layer
//!
//! Inbound: the API the transport layer drives.
//! Outbound: the signing backend the chain depends on.

mod inbound;
mod outbound;

pub use inbound::*;
pub use outbound::*;
