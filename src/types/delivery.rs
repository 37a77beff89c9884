//! Delivery types shared by the transport and the session.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ChatError;

/// One item produced while an agent answers a turn.
///
/// A delivery is zero or more [`RunIdentified`](Self::RunIdentified) and
/// [`Chunk`](Self::Chunk) events followed by exactly one terminal item:
/// either [`Completed`](Self::Completed) or an `Err` in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryEvent {
    /// The backend revealed the identifier used to continue this run.
    RunIdentified(String),
    /// Incremental text, appended to the answer so far.
    Chunk(String),
    /// The run finished. `final_text`, when present, replaces the answer.
    Completed { final_text: Option<String> },
}

impl DeliveryEvent {
    pub fn chunk(text: impl Into<String>) -> Self {
        Self::Chunk(text.into())
    }

    pub fn completed() -> Self {
        Self::Completed { final_text: None }
    }

    pub fn completed_with(text: impl Into<String>) -> Self {
        Self::Completed {
            final_text: Some(text.into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Stream of delivery events for a single turn.
pub type Delivery = BoxStream<'static, Result<DeliveryEvent, ChatError>>;

/// How the agent service hands back answers.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeliveryMode {
    /// Response body is read incrementally and every fragment is shown as it arrives.
    #[default]
    #[strum(to_string = "stream", serialize = "streaming")]
    Stream,
    /// Submission returns a run id; a status endpoint is polled until done.
    #[strum(to_string = "poll", serialize = "polling")]
    Poll,
}
