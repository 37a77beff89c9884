//! Convenience re-exports for common use.

pub use crate::config::AgentConfig;
pub use crate::error::{ChatError, Result};
pub use crate::session::{ChatSession, ChatSnapshot, Notification, NotificationKind, TurnOutcome};
pub use crate::transport::{AgentTransport, HttpTransport, SessionContext};
pub use crate::types::{Delivery, DeliveryEvent, DeliveryMode, Message, Sender};
pub use crate::util::poll::PollPolicy;
