//! Chat session: drives one conversation against an [`AgentTransport`].
//!
//! - [`ChatSession::submit`] runs one turn to completion
//! - [`ChatSession::send_message`] does the same in the background
//! - [`ChatSession::watch_snapshot`] follows messages and flags as they change
//! - [`ChatSession::take_notifications`] receives failure notices
//! - [`ChatSession::reset`] starts a new conversation
//! - [`ChatSession::shutdown`] aborts the in-flight turn and stops accepting input

pub mod state;

pub use state::{
    ChatSnapshot, ConversationState, Notification, NotificationKind, TurnOutcome, TurnPhase,
    TurnPlan,
};

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::error::ChatError;
use crate::transport::{AgentTransport, HttpTransport, SessionContext};
use crate::util::timeout::with_cancellation;

struct SessionInner {
    transport: Arc<dyn AgentTransport>,
    state: Mutex<ConversationState>,
    snapshot_tx: watch::Sender<ChatSnapshot>,
    notify_tx: mpsc::UnboundedSender<Notification>,
    notify_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<Notification>>>,
    shutdown: CancellationToken,
}

/// Handle to a chat session. Cloning yields another handle to the same session.
///
/// At most one turn runs at a time; submissions made while a turn is active
/// are ignored.
///
/// # Example
///
/// ```ignore
/// let session = ChatSession::from_config(AgentConfig::from_env()?)?;
/// let mut snapshots = session.watch_snapshot();
/// session.send_message("find investors");
/// while snapshots.changed().await.is_ok() {
///     render(&snapshots.borrow());
/// }
/// ```
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

impl ChatSession {
    /// Create a session that talks through `transport`.
    pub fn new(transport: Arc<dyn AgentTransport>) -> Self {
        Self::with_state(transport, ConversationState::default())
    }

    /// Create a session with an HTTP transport built from `config`.
    pub fn from_config(config: AgentConfig) -> Result<Self, ChatError> {
        Ok(Self::new(Arc::new(HttpTransport::new(config)?)))
    }

    /// Create a session starting from an existing state (e.g. a fixed chat id).
    pub fn with_state(transport: Arc<dyn AgentTransport>, state: ConversationState) -> Self {
        let (snapshot_tx, _) = watch::channel(state.snapshot());
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(SessionInner {
                transport,
                state: Mutex::new(state),
                snapshot_tx,
                notify_tx,
                notify_rx: std::sync::Mutex::new(Some(notify_rx)),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> ChatSnapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    ///
    /// A new snapshot is published after every change to the message list or
    /// flags, in the order the changes happened.
    pub fn watch_snapshot(&self) -> watch::Receiver<ChatSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Take the notification receiver. Only the first caller gets it.
    pub fn take_notifications(&self) -> Option<mpsc::UnboundedReceiver<Notification>> {
        self.inner
            .notify_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Fire-and-forget [`submit`](Self::submit).
    ///
    /// The turn keeps running if the returned handle is dropped.
    pub fn send_message(&self, text: impl Into<String>) -> JoinHandle<TurnOutcome> {
        let session = self.clone();
        let text = text.into();
        tokio::spawn(async move { session.submit(text).await })
    }

    /// Run one turn: record the question, ask the agent, apply its answer.
    ///
    /// Returns [`TurnOutcome::Ignored`] without any state change if a turn is
    /// already running, the text is blank, or the session has been shut down.
    /// Failures never escape: they are reported through the outcome, the
    /// notification channel, and the removal of the unfinished bot message.
    ///
    /// The turn runs on its own task. Dropping this future aborts the turn,
    /// which is then cleaned up like [`shutdown`](Self::shutdown) would.
    pub async fn submit(&self, text: impl Into<String>) -> TurnOutcome {
        if self.is_shut_down() {
            return TurnOutcome::Ignored;
        }

        let text = text.into();
        let (plan, context) = {
            let mut state = self.inner.state.lock().await;
            let Some(plan) = state.begin_turn(&text) else {
                debug!("Submission ignored; a turn is already active or the text is blank");
                return TurnOutcome::Ignored;
            };
            let context = SessionContext::new(state.chat_id());
            self.publish(&state);
            (plan, context)
        };

        info!(
            continuation = plan.is_continuation(),
            chat_id = %context.chat_id,
            "Turn submitted"
        );

        let abort = self.inner.shutdown.child_token();
        let abort_on_drop = abort.clone().drop_guard();
        let session = self.clone();
        let handle = tokio::spawn(async move { session.drive_turn(plan, context, abort).await });

        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                warn!(error = %join_error, "Turn task ended abnormally");
                let mut state = self.inner.state.lock().await;
                state.fail(&ChatError::Cancelled);
                self.publish(&state);
                TurnOutcome::Cancelled
            }
        };
        abort_on_drop.disarm();
        outcome
    }

    /// Body of a submitted turn; always leaves the state idle.
    async fn drive_turn(
        &self,
        plan: TurnPlan,
        context: SessionContext,
        abort: CancellationToken,
    ) -> TurnOutcome {
        let result = with_cancellation(&abort, self.run_turn(plan, context)).await;

        match result {
            Ok(()) => {
                info!("Turn completed");
                TurnOutcome::Completed
            }
            Err(error) => {
                let mut state = self.inner.state.lock().await;
                let notification = state.fail(&error);
                self.publish(&state);
                drop(state);

                if let Some(notification) = notification {
                    warn!(error = %error, category = ?error.category(), "Turn failed");
                    let _ = self.inner.notify_tx.send(notification);
                } else {
                    info!("Turn cancelled");
                }
                TurnOutcome::from_error(&error)
            }
        }
    }

    /// Wait until no turn is active.
    pub async fn wait_for_idle(&self) {
        let mut rx = self.watch_snapshot();
        let _ = rx.wait_for(|snapshot| !snapshot.is_processing).await;
    }

    /// Discard the conversation and begin a new session with a fresh chat id
    /// and no run id. Waits for any active turn to finish first.
    pub async fn reset(&self) {
        loop {
            self.wait_for_idle().await;
            let mut state = self.inner.state.lock().await;
            if state.reset() {
                info!(chat_id = %state.chat_id(), "Session reset");
                self.publish(&state);
                return;
            }
        }
    }

    /// Abort the in-flight turn, if any, and ignore all later submissions.
    ///
    /// The aborted turn is cleaned up like a failure but raises no notification.
    pub fn shutdown(&self) {
        if !self.inner.shutdown.is_cancelled() {
            info!("Session shutting down");
            self.inner.shutdown.cancel();
        }
    }

    async fn run_turn(&self, plan: TurnPlan, context: SessionContext) -> Result<(), ChatError> {
        let transport = &self.inner.transport;
        let mut delivery = match &plan {
            TurnPlan::Start { question } => transport.start(question, &context).await?,
            TurnPlan::Continue { run_id, question } => {
                transport.continue_run(run_id, question).await?
            }
        };

        while let Some(item) = delivery.next().await {
            let event = item?;
            let mut state = self.inner.state.lock().await;
            let finished = state.apply(event);
            self.publish(&state);
            if finished {
                return Ok(());
            }
        }

        // Body closed without an explicit terminal item: treat as completed.
        let mut state = self.inner.state.lock().await;
        state.apply(crate::types::DeliveryEvent::completed());
        self.publish(&state);
        Ok(())
    }

    fn publish(&self, state: &ConversationState) {
        self.inner.snapshot_tx.send_replace(state.snapshot());
    }
}
