//! Core types for agentchat.

pub mod delivery;
pub mod message;

pub use delivery::*;
pub use message::*;
