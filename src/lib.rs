//! agentchat: conversational client core for hosted agent services.
//!
//! Sends questions to a remote agent over HTTP and turns its answers into an
//! ordered list of chat messages plus two flags (`is_processing`,
//! `is_searching`). Works with agents that stream their answer and with
//! agents that must be polled; both look the same to the session.
//!
//! # Quick Start
//!
//! ```no_run
//! use agentchat::prelude::*;
//!
//! # async fn example() -> agentchat::error::Result<()> {
//! let session = ChatSession::from_config(AgentConfig::from_env()?)?;
//! session.submit("find investors").await;
//! for message in session.snapshot().messages {
//!     println!("{}: {}", message.sender, message.content);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod prelude;
pub mod session;
pub mod transport;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
