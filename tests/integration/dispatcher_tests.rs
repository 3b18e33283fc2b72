//! Integration tests for message routing through `Dispatcher`.
//!
//! Covers binding checks, session start and conversation persistence,
//! decision answers typed as ordinary messages, the busy notice, abort, and
//! per-channel queueing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use agent_switchboard::driver::SessionEvent;
use agent_switchboard::models::session::{OutcomeStatus, SessionOutcome};
use agent_switchboard::orchestrator::{ChannelRegistry, Dispatch, Dispatcher};
use agent_switchboard::persistence::{channel_repo::ChannelRepo, db};

use super::test_helpers::{emit, next_decision, next_event, FakeCli, EVENT_WAIT};

struct Harness {
    cli: FakeCli,
    repo: ChannelRepo,
    dispatcher: Dispatcher,
    events: mpsc::Receiver<SessionEvent>,
}

async fn harness(body: &str) -> Harness {
    let cli = FakeCli::new(body);
    let db = db::connect_memory().await.expect("db");
    let repo = ChannelRepo::new(Arc::new(db));
    repo.bind("C1", cli.workspace()).await.expect("bind");

    let (tx, events) = mpsc::channel(256);
    let dispatcher = Dispatcher::new(
        Arc::new(cli.global_config()),
        ChannelRegistry::new(),
        repo.clone(),
        tx,
    );
    Harness {
        cli,
        repo,
        dispatcher,
        events,
    }
}

async fn started(dispatcher: &Dispatcher, text: &str) -> tokio::task::JoinHandle<()> {
    match dispatcher.handle_message("C1", text).await.expect("dispatch") {
        Dispatch::Started(handle) => handle,
        other => panic!("expected a started session, got {other:?}"),
    }
}

async fn reply(dispatcher: &Dispatcher, text: &str) -> String {
    match dispatcher.handle_message("C1", text).await.expect("dispatch") {
        Dispatch::Reply(reply) => reply,
        other => panic!("expected a reply, got {other:?}"),
    }
}

async fn finished(events: &mut mpsc::Receiver<SessionEvent>) -> SessionOutcome {
    loop {
        if let SessionEvent::Finished { outcome, .. } = next_event(events).await {
            return outcome;
        }
    }
}

async fn settle(handle: tokio::task::JoinHandle<()>) {
    tokio::time::timeout(EVENT_WAIT, handle)
        .await
        .expect("session settles")
        .expect("join");
}

// ── Routing basics ──────────────────────────────────────────────────────────

#[tokio::test]
async fn unbound_channel_and_blank_messages_are_not_run() {
    let h = harness("exit 0").await;

    assert!(matches!(
        h.dispatcher.handle_message("C9", "hello").await.expect("dispatch"),
        Dispatch::Unbound
    ));
    assert!(matches!(
        h.dispatcher.handle_message("C1", "   ").await.expect("dispatch"),
        Dispatch::Ignored
    ));
    assert!(h.cli.launches().is_empty());
}

#[tokio::test]
async fn commands_are_answered_inline() {
    let h = harness("exit 0").await;

    assert_eq!(reply(&h.dispatcher, "!abort").await, "No session is running.");
    assert!(reply(&h.dispatcher, "!info").await.starts_with("Directory:"));
    assert!(h.cli.launches().is_empty());
}

// ── Sessions and conversation identity ──────────────────────────────────────

#[tokio::test]
async fn conversation_identity_is_stored_and_resumed() {
    let body = emit(r#"{"type":"result","result":"done","session_id":"conv-x"}"#);
    let mut h = harness(&body).await;

    settle(started(&h.dispatcher, "first task").await).await;
    let outcome = finished(&mut h.events).await;
    assert_eq!(outcome.status, OutcomeStatus::Completed);
    assert_eq!(outcome.text, "done");

    let binding = h.repo.get("C1").await.expect("get").expect("bound");
    assert_eq!(binding.conversation_id.as_deref(), Some("conv-x"));
    assert!(h.dispatcher.registry().session("C1").is_none(), "slot cleared");

    settle(started(&h.dispatcher, "second task").await).await;
    let launches = h.cli.launches();
    assert_eq!(launches.len(), 2);
    assert!(!launches[0].contains("--resume"));
    assert!(launches[1].contains("--resume conv-x"));
}

#[tokio::test]
async fn auto_grant_policy_comes_from_binding() {
    let mut h = harness(&emit(r#"{"type":"result","result":"ok"}"#)).await;
    h.repo.set_auto_grant("C1", true).await.expect("policy");

    settle(started(&h.dispatcher, "go").await).await;
    finished(&mut h.events).await;

    assert!(h.cli.launches()[0].ends_with("--dangerously-skip-permissions"));
}

// ── Decisions answered by message ───────────────────────────────────────────

#[tokio::test]
async fn free_text_answers_clarification() {
    let body = format!(
        "{}\n{}",
        emit(r#"{"type":"system","subtype":"input_request","question":"Which color?"}"#),
        r#"read -r reply; printf '{"type":"result","result":"answer=%s"}\n' "$reply""#
    );
    let mut h = harness(&body).await;
    let handle = started(&h.dispatcher, "paint it").await;

    let request = next_decision(&mut h.events).await;
    match h.dispatcher.handle_message("C1", "blue").await.expect("dispatch") {
        Dispatch::Answered { request_id } => assert_eq!(request_id, request.id),
        other => panic!("expected an answer, got {other:?}"),
    }

    settle(handle).await;
    assert_eq!(finished(&mut h.events).await.text, "answer=blue");
}

#[tokio::test]
async fn authorization_needs_a_recognized_word() {
    let body = format!(
        "{}\n{}",
        emit(r#"{"type":"system","subtype":"permission_request","tool":"Bash"}"#),
        r#"read -r reply; printf '{"type":"result","result":"reply=%s"}\n' "$reply""#
    );
    let mut h = harness(&body).await;
    let handle = started(&h.dispatcher, "run it").await;

    next_decision(&mut h.events).await;
    assert!(reply(&h.dispatcher, "maybe later").await.contains("Reply `y`"));
    assert!(h.dispatcher.registry().is_busy("C1"));
    assert!(matches!(
        h.dispatcher.handle_message("C1", "y").await.expect("dispatch"),
        Dispatch::Answered { .. }
    ));

    settle(handle).await;
    assert_eq!(finished(&mut h.events).await.text, "reply=y");
}

// ── Busy channel ────────────────────────────────────────────────────────────

#[tokio::test]
async fn busy_channel_gets_notice_and_can_be_aborted() {
    let body = format!(
        "{}\nexec sleep 30",
        emit(r#"{"type":"assistant","message":{"content":[{"type":"text","text":"working"}]}}"#)
    );
    let mut h = harness(&body).await;
    let handle = started(&h.dispatcher, "long task").await;

    assert!(matches!(next_event(&mut h.events).await, SessionEvent::Status(_)));
    assert!(reply(&h.dispatcher, "another task").await.contains("already running"));
    assert_eq!(h.dispatcher.registry().active_channels(), vec!["C1"]);

    assert_eq!(reply(&h.dispatcher, "!abort").await, "Session aborted.");
    settle(handle).await;

    let outcome = finished(&mut h.events).await;
    assert_eq!(outcome.status, OutcomeStatus::Aborted);
    assert_eq!(h.cli.launches().len(), 1);
    assert_eq!(h.dispatcher.registry().active_count(), 0);
}

#[tokio::test]
async fn queued_session_waits_for_channel() {
    let mut h = harness(&emit(r#"{"type":"result","result":"ran"}"#)).await;

    let permit = h.dispatcher.registry().acquire("C1").await;
    let handle = started(&h.dispatcher, "queued").await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(h.cli.launches().is_empty(), "session must wait for the channel");

    drop(permit);
    settle(handle).await;
    assert_eq!(finished(&mut h.events).await.text, "ran");
    assert_eq!(h.cli.launches().len(), 1);
}

#[tokio::test]
async fn session_queued_on_unbound_channel_does_not_run() {
    let h = harness(&emit(r#"{"type":"result","result":"ran"}"#)).await;

    let permit = h.dispatcher.registry().acquire("C1").await;
    let handle = started(&h.dispatcher, "queued").await;
    assert_eq!(reply(&h.dispatcher, "!unbind").await, "Channel unbound.");

    drop(permit);
    settle(handle).await;
    assert!(h.cli.launches().is_empty());
}
