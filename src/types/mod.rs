//! Core types for the bot host runtime.
//!
//! Contains JIDs and the event vocabulary exchanged with the protocol
//! client.

mod events;
mod jid;

pub use events::*;
pub use jid::*;
