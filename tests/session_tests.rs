//! Turn lifecycle tests for `ChatSession` against a scripted transport.

mod common;

use std::sync::Arc;

use common::{Call, Script, ScriptedTransport};
use pretty_assertions::assert_eq;

use agentchat::error::{ChatError, ErrorCategory};
use agentchat::session::{
    ChatSession, ChatSnapshot, ConversationState, NotificationKind, TurnOutcome,
};
use agentchat::types::{DeliveryEvent, Sender};

fn session_with(transport: &Arc<ScriptedTransport>) -> ChatSession {
    ChatSession::with_state(transport.clone(), ConversationState::new("chat_fixed"))
}

fn transcript(snapshot: &ChatSnapshot) -> Vec<(Sender, String)> {
    snapshot
        .messages
        .iter()
        .map(|m| (m.sender, m.content.clone()))
        .collect()
}

/// Record every snapshot the session publishes until the returned handle is awaited.
fn record_snapshots(session: &ChatSession) -> tokio::task::JoinHandle<Vec<ChatSnapshot>> {
    let mut rx = session.watch_snapshot();
    tokio::spawn(async move {
        let mut seen = vec![rx.borrow_and_update().clone()];
        while rx.changed().await.is_ok() {
            seen.push(rx.borrow_and_update().clone());
        }
        seen
    })
}

#[tokio::test]
async fn streamed_answer_accumulates_chunks() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.queue_stream(Some("run_1"), &["Here ", "are ", "3 contacts."]);
    let session = session_with(&transport);

    let outcome = session.submit("find investors").await;

    assert_eq!(outcome, TurnOutcome::Completed);
    let snap = session.snapshot();
    assert_eq!(
        transcript(&snap),
        vec![
            (Sender::User, "find investors".to_string()),
            (Sender::Bot, "Here are 3 contacts.".to_string()),
        ]
    );
    assert!(!snap.is_processing);
    assert!(!snap.is_searching);
    assert!(snap.messages.iter().all(|m| !m.is_loading));
    assert_eq!(snap.run_id.as_deref(), Some("run_1"));
    assert_eq!(
        transport.calls(),
        vec![Call::Start {
            question: "find investors".into(),
            chat_id: "chat_fixed".into()
        }]
    );
}

#[tokio::test]
async fn polled_answer_replaces_placeholder() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.queue(Script::Events(vec![
        Ok(DeliveryEvent::RunIdentified("run_poll".into())),
        Ok(DeliveryEvent::completed_with("Found 2 founders.")),
    ]));
    let session = session_with(&transport);

    assert_eq!(session.submit("find founders").await, TurnOutcome::Completed);

    let snap = session.snapshot();
    assert_eq!(snap.messages[1].content, "Found 2 founders.");
    assert!(!snap.messages[1].is_loading);
}

#[tokio::test]
async fn submits_during_active_turn_are_ignored() {
    let transport = Arc::new(ScriptedTransport::new());
    let live = transport.queue_live();
    let session = session_with(&transport);

    let first = session.send_message("first");
    session
        .watch_snapshot()
        .wait_for(|s| s.is_processing)
        .await
        .unwrap();

    for _ in 0..5 {
        assert_eq!(session.submit("again").await, TurnOutcome::Ignored);
    }
    assert_eq!(session.snapshot().messages.len(), 2);

    live.send(Ok(DeliveryEvent::chunk("done"))).unwrap();
    live.send(Ok(DeliveryEvent::completed())).unwrap();
    assert_eq!(first.await.unwrap(), TurnOutcome::Completed);

    assert_eq!(transport.calls().len(), 1);
    assert_eq!(session.snapshot().messages.len(), 2);
}

#[tokio::test]
async fn searching_ends_on_first_visible_chunk_and_stays_off() {
    let transport = Arc::new(ScriptedTransport::new());
    let live = transport.queue_live();
    let session = session_with(&transport);
    let recorder = record_snapshots(&session);
    let mut rx = session.watch_snapshot();

    let turn = session.send_message("find investors");
    rx.wait_for(|s| s.is_searching).await.unwrap();

    live.send(Ok(DeliveryEvent::RunIdentified("run_1".into()))).unwrap();
    live.send(Ok(DeliveryEvent::chunk(""))).unwrap();
    live.send(Ok(DeliveryEvent::chunk("Here "))).unwrap();
    {
        let snap = rx
            .wait_for(|s| s.messages.get(1).is_some_and(|m| m.content == "Here "))
            .await
            .unwrap();
        assert!(snap.is_processing);
        assert!(!snap.is_searching);
    }

    live.send(Ok(DeliveryEvent::chunk("we go"))).unwrap();
    live.send(Ok(DeliveryEvent::completed())).unwrap();
    assert_eq!(turn.await.unwrap(), TurnOutcome::Completed);

    drop(rx);
    drop(session);
    let seen = recorder.await.unwrap();

    assert!(seen.iter().all(|s| !s.is_searching || s.is_processing));
    let receiving = seen
        .iter()
        .position(|s| s.is_processing && !s.is_searching)
        .expect("turn reached the receiving phase");
    assert!(seen[receiving..].iter().all(|s| !s.is_searching));
    assert!(!seen.last().unwrap().is_processing);
}

#[tokio::test]
async fn start_failure_keeps_user_message_and_raises_notification() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.queue(Script::Reject(ChatError::api(500, "Internal Server Error")));
    let session = session_with(&transport);
    let mut notifications = session.take_notifications().unwrap();

    let outcome = session.submit("find investors").await;

    assert!(matches!(
        outcome,
        TurnOutcome::Failed {
            category: ErrorCategory::Transport,
            ..
        }
    ));
    let snap = session.snapshot();
    assert_eq!(
        transcript(&snap),
        vec![(Sender::User, "find investors".to_string())]
    );
    assert!(!snap.is_processing);
    assert!(!snap.is_searching);
    assert_eq!(snap.run_id, None);

    let notice = notifications.try_recv().unwrap();
    assert_eq!(notice.kind, NotificationKind::Error);
    assert_eq!(notice.title, "Error");
    assert_eq!(notice.description, "API error: 500");
}

#[tokio::test]
async fn mid_stream_failure_removes_partial_answer() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.queue(Script::Events(vec![
        Ok(DeliveryEvent::chunk("Here are")),
        Err(ChatError::Body("connection reset".into())),
    ]));
    let session = session_with(&transport);

    session.submit("find investors").await;

    let snap = session.snapshot();
    assert_eq!(snap.messages.len(), 1);
    assert!(snap.messages[0].is_user());
    assert!(snap.messages.iter().all(|m| !m.is_loading));
}

#[tokio::test]
async fn poll_timeout_raises_distinct_notification() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.queue(Script::Events(vec![
        Ok(DeliveryEvent::RunIdentified("run_slow".into())),
        Err(ChatError::Timeout { attempts: 60 }),
    ]));
    let session = session_with(&transport);
    let mut notifications = session.take_notifications().unwrap();

    assert_eq!(session.submit("slow question").await, TurnOutcome::TimedOut);

    let notice = notifications.try_recv().unwrap();
    assert_eq!(notice.kind, NotificationKind::Timeout);
    assert!(notice.description.contains("taking longer than expected"));
    assert_eq!(session.snapshot().messages.len(), 1);
    assert!(!session.snapshot().is_processing);
}

#[tokio::test]
async fn run_id_survives_failed_turn_and_drives_continuation() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.queue_stream(Some("run_1"), &["first answer"]);
    transport.queue(Script::Reject(ChatError::api(502, "bad gateway")));
    transport.queue_stream(None, &["third answer"]);
    let session = session_with(&transport);

    session.submit("one").await;
    session.submit("two").await;
    session.submit("three").await;

    assert_eq!(
        transport.calls(),
        vec![
            Call::Start {
                question: "one".into(),
                chat_id: "chat_fixed".into()
            },
            Call::Continue {
                run_id: "run_1".into(),
                question: "two".into()
            },
            Call::Continue {
                run_id: "run_1".into(),
                question: "three".into()
            },
        ]
    );
    assert_eq!(
        transcript(&session.snapshot()),
        vec![
            (Sender::User, "one".to_string()),
            (Sender::Bot, "first answer".to_string()),
            (Sender::User, "two".to_string()),
            (Sender::User, "three".to_string()),
            (Sender::Bot, "third answer".to_string()),
        ]
    );
}

#[tokio::test]
async fn missing_run_id_falls_back_to_new_run() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.queue_stream(None, &["no id here"]);
    transport.queue_stream(None, &["still none"]);
    let session = session_with(&transport);

    session.submit("one").await;
    session.submit("two").await;

    let calls = transport.calls();
    assert!(matches!(calls[0], Call::Start { .. }));
    assert!(matches!(calls[1], Call::Start { .. }));
    assert_eq!(session.snapshot().run_id, None);
}

#[tokio::test]
async fn reset_starts_fresh_conversation() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.queue_stream(Some("run_1"), &["hello"]);
    transport.queue_stream(Some("run_2"), &["hi again"]);
    let session = session_with(&transport);

    session.submit("one").await;
    session.reset().await;
    session.submit("two").await;

    let calls = transport.calls();
    let Call::Start { chat_id, .. } = &calls[1] else {
        panic!("expected a new run after reset, got {:?}", calls[1]);
    };
    assert_ne!(chat_id, "chat_fixed");
    assert_eq!(session.snapshot().run_id.as_deref(), Some("run_2"));
    assert_eq!(session.snapshot().messages.len(), 2);
}

#[tokio::test]
async fn shutdown_aborts_live_turn_without_notification() {
    let transport = Arc::new(ScriptedTransport::new());
    let live = transport.queue_live();
    let session = session_with(&transport);
    let mut notifications = session.take_notifications().unwrap();

    let turn = session.send_message("long question");
    live.send(Ok(DeliveryEvent::chunk("partial"))).unwrap();
    session
        .watch_snapshot()
        .wait_for(|s| s.messages.get(1).is_some_and(|m| m.content == "partial"))
        .await
        .unwrap();

    session.shutdown();

    assert_eq!(turn.await.unwrap(), TurnOutcome::Cancelled);
    assert_eq!(session.snapshot().messages.len(), 1);
    assert!(notifications.try_recv().is_err());
    assert!(live.send(Ok(DeliveryEvent::chunk("late"))).is_err());
}

#[tokio::test]
async fn abandoned_submit_leaves_session_usable() {
    let transport = Arc::new(ScriptedTransport::new());
    let live = transport.queue_live();
    transport.queue_stream(Some("run_2"), &["second answer"]);
    let session = session_with(&transport);

    let abandoned = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        session.submit("first"),
    )
    .await;
    assert!(abandoned.is_err());

    session.wait_for_idle().await;
    let snap = session.snapshot();
    assert!(!snap.is_processing);
    assert!(!snap.is_searching);
    assert_eq!(
        transcript(&snap),
        vec![(Sender::User, "first".to_string())]
    );
    assert!(live.send(Ok(DeliveryEvent::chunk("late"))).is_err());

    assert_eq!(session.submit("second").await, TurnOutcome::Completed);
    assert_eq!(session.snapshot().messages[2].content, "second");
    assert_eq!(session.snapshot().messages[3].content, "second answer");
}
