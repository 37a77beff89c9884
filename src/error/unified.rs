//! Error classification and recovery hints.

use serde::{Deserialize, Serialize};

/// Broad error category, used to pick the notification shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Network failure, non-success HTTP status, or unreadable body.
    Transport,
    /// Response arrived but had an unexpected shape.
    Protocol,
    /// The agent service reported the run as failed.
    RemoteFailure,
    /// The polling budget ran out before a terminal status.
    Timeout,
    Configuration,
    Cancelled,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Send the same question again.
    Resubmit,
    /// The agent may still be working; wait before resubmitting.
    WaitAndResubmit,
    CheckConfiguration,
    None,
}
