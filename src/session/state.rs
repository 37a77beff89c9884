//! Synchronous conversation state machine.
//!
//! Holds the message list and run identity for one session. Every method is
//! a plain state transition with no I/O, so ordering can be tested without a
//! network or a runtime.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ChatError, ErrorCategory};
use crate::types::{DeliveryEvent, Message};

/// Observable state handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSnapshot {
    pub messages: Vec<Message>,
    pub is_processing: bool,
    pub is_searching: bool,
    pub chat_id: String,
    pub run_id: Option<String>,
}

/// Where the current turn is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    /// Submitted, nothing useful has arrived yet.
    Awaiting,
    /// Output is arriving.
    Receiving,
}

/// What the transport should be asked to do for a new turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnPlan {
    Start { question: String },
    Continue { run_id: String, question: String },
}

impl TurnPlan {
    pub fn question(&self) -> &str {
        match self {
            Self::Start { question } | Self::Continue { question, .. } => question,
        }
    }

    pub fn is_continuation(&self) -> bool {
        matches!(self, Self::Continue { .. })
    }
}

/// How a call to submit ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Another turn was active, the text was blank, or the session is shut down.
    Ignored,
    Completed,
    Failed {
        category: ErrorCategory,
        message: String,
    },
    TimedOut,
    Cancelled,
}

impl TurnOutcome {
    pub fn from_error(error: &ChatError) -> Self {
        match error.category() {
            ErrorCategory::Timeout => Self::TimedOut,
            ErrorCategory::Cancelled => Self::Cancelled,
            category => Self::Failed {
                category,
                message: error.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Error,
    Timeout,
}

/// User-facing failure notice (a toast in a GUI, a stderr line in a terminal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub kind: NotificationKind,
}

impl Notification {
    pub fn from_error(error: &ChatError) -> Self {
        let kind = match error.category() {
            ErrorCategory::Timeout => NotificationKind::Timeout,
            _ => NotificationKind::Error,
        };
        Self {
            title: "Error".to_string(),
            description: error.user_message(),
            kind,
        }
    }
}

#[derive(Debug, Clone)]
struct ActiveTurn {
    bot_message_id: String,
    searching: bool,
    /// Run id seen while opening a new run; kept only if the turn completes.
    pending_run_id: Option<String>,
}

/// Message list, run identity and turn flags for one session.
#[derive(Debug, Clone)]
pub struct ConversationState {
    messages: Vec<Message>,
    chat_id: String,
    run_id: Option<String>,
    active: Option<ActiveTurn>,
    next_seq: u64,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new(new_chat_id())
    }
}

impl ConversationState {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            chat_id: chat_id.into(),
            run_id: None,
            active: None,
            next_seq: 0,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn is_processing(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_searching(&self) -> bool {
        self.active.as_ref().is_some_and(|t| t.searching)
    }

    pub fn phase(&self) -> TurnPhase {
        match &self.active {
            None => TurnPhase::Idle,
            Some(turn) if turn.searching => TurnPhase::Awaiting,
            Some(_) => TurnPhase::Receiving,
        }
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            messages: self.messages.clone(),
            is_processing: self.is_processing(),
            is_searching: self.is_searching(),
            chat_id: self.chat_id.clone(),
            run_id: self.run_id.clone(),
        }
    }

    /// Open a turn for `text`.
    ///
    /// Returns `None` without touching state when a turn is already active or
    /// the text is blank. Otherwise appends the user message and an empty bot
    /// placeholder and decides between starting and continuing a run.
    pub fn begin_turn(&mut self, text: &str) -> Option<TurnPlan> {
        if self.active.is_some() || text.trim().is_empty() {
            return None;
        }

        let user_id = self.next_id("user");
        self.messages.push(Message::user(user_id, text));

        let bot_message_id = self.next_id("bot");
        self.messages
            .push(Message::bot_placeholder(bot_message_id.clone()));

        self.active = Some(ActiveTurn {
            bot_message_id,
            searching: true,
            pending_run_id: None,
        });

        let question = text.to_string();
        Some(match &self.run_id {
            Some(run_id) => TurnPlan::Continue {
                run_id: run_id.clone(),
                question,
            },
            None => TurnPlan::Start { question },
        })
    }

    /// Apply one delivery event to the active turn.
    ///
    /// Returns `true` when the event ended the turn. Events with no active
    /// turn are dropped.
    pub fn apply(&mut self, event: DeliveryEvent) -> bool {
        match event {
            DeliveryEvent::RunIdentified(run_id) => {
                self.note_run_id(run_id);
                false
            }
            DeliveryEvent::Chunk(text) => {
                self.append_chunk(&text);
                false
            }
            DeliveryEvent::Completed { final_text } => self.complete(final_text),
        }
    }

    fn note_run_id(&mut self, run_id: String) {
        // Continuations already hold the run id; it never changes mid-session.
        if self.run_id.is_some() {
            return;
        }
        if let Some(turn) = self.active.as_mut() {
            turn.pending_run_id.get_or_insert(run_id);
        }
    }

    fn append_chunk(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let Some(turn) = self.active.as_mut() else {
            return;
        };
        turn.searching = false;
        let id = turn.bot_message_id.clone();
        if let Some(msg) = self.messages.iter_mut().find(|m| m.id == id) {
            msg.content.push_str(text);
        }
    }

    fn complete(&mut self, final_text: Option<String>) -> bool {
        let Some(turn) = self.active.take() else {
            return false;
        };
        if let Some(msg) = self
            .messages
            .iter_mut()
            .find(|m| m.id == turn.bot_message_id)
        {
            if let Some(text) = final_text {
                msg.content = text;
            }
            msg.is_loading = false;
        }
        if self.run_id.is_none() {
            self.run_id = turn.pending_run_id;
        }
        true
    }

    /// End the active turn after `error`.
    ///
    /// Removes the turn's bot placeholder (the user message stays) and keeps
    /// the run id. Returns the notification to show, if any; cancellation is
    /// silent.
    pub fn fail(&mut self, error: &ChatError) -> Option<Notification> {
        let turn = self.active.take()?;
        self.messages.retain(|m| m.id != turn.bot_message_id);

        if matches!(error, ChatError::Cancelled) {
            return None;
        }
        Some(Notification::from_error(error))
    }

    /// Discard the conversation and begin a new session with a fresh chat id.
    ///
    /// Refuses (returns `false`) while a turn is active.
    pub fn reset(&mut self) -> bool {
        if self.active.is_some() {
            return false;
        }
        self.messages.clear();
        self.run_id = None;
        self.chat_id = new_chat_id();
        true
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_seq += 1;
        format!(
            "{prefix}_{}_{}",
            Utc::now().timestamp_millis(),
            self.next_seq
        )
    }
}

fn new_chat_id() -> String {
    format!("chat_{}", Uuid::new_v4().simple())
}
