//! Chat message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Who authored a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// A single chat bubble.
///
/// User messages are immutable once created. Bot messages start empty and
/// grow as the agent answers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_loading: bool,
}

impl Message {
    /// Create a user message.
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            sender: Sender::User,
            timestamp: Utc::now(),
            is_loading: false,
        }
    }

    /// Create an empty bot placeholder that is still loading.
    pub fn bot_placeholder(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: String::new(),
            sender: Sender::Bot,
            timestamp: Utc::now(),
            is_loading: true,
        }
    }

    pub fn is_user(&self) -> bool {
        self.sender == Sender::User
    }

    pub fn is_bot(&self) -> bool {
        self.sender == Sender::Bot
    }
}
