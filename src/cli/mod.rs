//! Terminal front-end for agentchat.

use clap::Parser;

use crate::session::ChatSnapshot;
use crate::types::{DeliveryMode, Sender};

/// Hint shown before the first question.
pub const EMPTY_STATE_HINT: &str = "Who do you want to meet?";

/// Shown once per turn while the agent has not produced any output.
pub const SEARCHING_INDICATOR: &str = "searching…";

/// agentchat CLI
#[derive(Parser, Debug)]
#[command(name = "agentchat", version, about = "Chat with a hosted agent from the terminal")]
pub struct Cli {
    /// Delivery mode (stream or poll); overrides AGENTCHAT_DELIVERY_MODE
    #[arg(short, long)]
    pub mode: Option<DeliveryMode>,

    /// Agent endpoint URL; overrides AGENTCHAT_AGENT_URL
    #[arg(long)]
    pub agent_url: Option<String>,

    /// Ask a single question and exit instead of starting a prompt loop
    pub question: Option<String>,
}

/// What the user typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLine {
    Quit,
    Reset,
    Question(String),
    Blank,
}

impl InputLine {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Self::Blank,
            "/quit" | "/exit" => Self::Quit,
            "/reset" => Self::Reset,
            text => Self::Question(text.to_string()),
        }
    }
}

/// Prints only what changed in the bot's latest message between snapshots.
#[derive(Debug, Default)]
pub struct Renderer {
    bot_id: Option<String>,
    printed: String,
    indicated: bool,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text to write for `snapshot`, or `None` when nothing new is visible.
    pub fn delta(&mut self, snapshot: &ChatSnapshot) -> Option<String> {
        let last = snapshot.messages.last().filter(|m| m.sender == Sender::Bot)?;

        if self.bot_id.as_deref() != Some(last.id.as_str()) {
            self.bot_id = Some(last.id.clone());
            self.printed.clear();
            self.indicated = false;
        }

        if snapshot.is_searching {
            if self.indicated {
                return None;
            }
            self.indicated = true;
            return Some(format!("{SEARCHING_INDICATOR}\n"));
        }

        if last.content == self.printed {
            return None;
        }

        let out = match last.content.strip_prefix(self.printed.as_str()) {
            Some(rest) if !self.printed.is_empty() => rest.to_string(),
            // Content was replaced wholesale, or this is the first output.
            _ if self.printed.is_empty() => last.content.clone(),
            _ => format!("\n{}", last.content),
        };
        self.printed = last.content.clone();
        Some(out)
    }
}
