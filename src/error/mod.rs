//! Error types for agentchat.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all agentchat operations.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unreadable response body: {0}")]
    Body(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("Agent run failed: {detail}")]
    RemoteFailure { detail: String },

    #[error("No result after {attempts} poll attempts")]
    Timeout { attempts: u32 },

    #[error("Operation cancelled")]
    Cancelled,
}

impl ChatError {
    /// Create an API error from a status code and response body.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Api { .. } | Self::Network(_) | Self::Body(_) => ErrorCategory::Transport,
            Self::Serialization(_) | Self::Protocol(_) => ErrorCategory::Protocol,
            Self::RemoteFailure { .. } => ErrorCategory::RemoteFailure,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// Whether a single poll that hit this error may be retried on the next tick.
    ///
    /// An explicit failure reported by the agent is final; everything on the
    /// wire (bad status, broken connection, garbled payload) is not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transport | ErrorCategory::Protocol
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Timeout => RecoverySuggestion::WaitAndResubmit,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Cancelled => RecoverySuggestion::None,
            _ => RecoverySuggestion::Resubmit,
        }
    }

    /// Short human-readable reason suitable for a toast or status line.
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout { .. } => {
                "The agent is taking longer than expected. Please try again.".to_string()
            }
            Self::Api { status, .. } => format!("API error: {status}"),
            Self::Network(_) => "Could not reach the agent service.".to_string(),
            Self::Body(_) => "Response body is not readable".to_string(),
            Self::RemoteFailure { detail } if !detail.is_empty() => {
                format!("The agent reported an error: {detail}")
            }
            Self::RemoteFailure { .. } => "The agent reported an error.".to_string(),
            Self::Serialization(_) | Self::Protocol(_) => {
                "Received an unexpected response from the agent.".to_string()
            }
            Self::Configuration(msg) => format!("Configuration error: {msg}"),
            Self::Cancelled => "Failed to process your message. Please try again.".to_string(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ChatError>;
