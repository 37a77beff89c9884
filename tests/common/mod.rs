//! Shared test helpers: a scripted in-memory transport.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;
use tokio::sync::mpsc;

use agentchat::error::ChatError;
use agentchat::transport::{AgentTransport, SessionContext};
use agentchat::types::{Delivery, DeliveryEvent};

/// A transport call as seen by the scripted transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start { question: String, chat_id: String },
    Continue { run_id: String, question: String },
}

/// How the transport answers one call.
pub enum Script {
    /// The call itself fails before any delivery exists.
    Reject(ChatError),
    /// A fixed sequence of events.
    Events(Vec<Result<DeliveryEvent, ChatError>>),
    /// Events pushed by the test through a channel, one at a time.
    Live(mpsc::UnboundedReceiver<Result<DeliveryEvent, ChatError>>),
}

/// Transport that replays queued scripts in order and records every call.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Queue a streamed answer: optional run id, chunks, then completion.
    pub fn queue_stream(&self, run_id: Option<&str>, chunks: &[&str]) {
        let mut events = Vec::new();
        if let Some(id) = run_id {
            events.push(Ok(DeliveryEvent::RunIdentified(id.to_string())));
        }
        events.extend(chunks.iter().map(|c| Ok(DeliveryEvent::chunk(*c))));
        events.push(Ok(DeliveryEvent::completed()));
        self.queue(Script::Events(events));
    }

    /// Queue a live delivery and return its sender.
    pub fn queue_live(&self) -> mpsc::UnboundedSender<Result<DeliveryEvent, ChatError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.queue(Script::Live(rx));
        tx
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn next_delivery(&self) -> Result<Delivery, ChatError> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Events(vec![Ok(DeliveryEvent::completed())]));

        match script {
            Script::Reject(e) => Err(e),
            Script::Events(events) => Ok(Box::pin(stream::iter(events))),
            Script::Live(rx) => Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            }))),
        }
    }
}

#[async_trait]
impl AgentTransport for ScriptedTransport {
    async fn start(&self, question: &str, session: &SessionContext) -> Result<Delivery, ChatError> {
        self.calls.lock().unwrap().push(Call::Start {
            question: question.to_string(),
            chat_id: session.chat_id.clone(),
        });
        self.next_delivery()
    }

    async fn continue_run(&self, run_id: &str, question: &str) -> Result<Delivery, ChatError> {
        self.calls.lock().unwrap().push(Call::Continue {
            run_id: run_id.to_string(),
            question: question.to_string(),
        });
        self.next_delivery()
    }
}
