//! Unit tests for console rendering and output splitting.

use std::time::Duration;

use agent_switchboard::console::{render_dispatch, render_event, split_output};
use agent_switchboard::driver::{SessionEvent, StatusUpdate};
use agent_switchboard::models::decision::{DecisionKind, PendingRequest};
use agent_switchboard::models::session::{OutcomeStatus, SessionOutcome};
use agent_switchboard::orchestrator::Dispatch;

fn finished(text: &str) -> SessionEvent {
    SessionEvent::Finished {
        channel_id: "C1".into(),
        session_id: "s1".into(),
        outcome: SessionOutcome {
            status: OutcomeStatus::Completed,
            text: text.into(),
            elapsed: Duration::from_secs(12),
            conversation_id: None,
        },
    }
}

// ── split_output ────────────────────────────────────────────────────────────

#[test]
fn short_text_is_one_chunk() {
    assert_eq!(split_output("hello", 10), vec!["hello"]);
    assert_eq!(split_output("", 10), vec![""]);
}

#[test]
fn long_text_is_split_by_characters() {
    assert_eq!(split_output("abcdefg", 3), vec!["abc", "def", "g"]);
    assert_eq!(split_output("ééé", 2), vec!["éé", "é"]);
}

#[test]
fn zero_limit_disables_splitting() {
    assert_eq!(split_output("abcdefg", 0), vec!["abcdefg"]);
}

// ── render_event ────────────────────────────────────────────────────────────

#[test]
fn finished_short_output() {
    let blocks = render_event(&finished("all green"), 100);
    assert_eq!(blocks, vec!["[C1] completed in 12s", "all green"]);
}

#[test]
fn finished_long_output_is_numbered() {
    let blocks = render_event(&finished("abcdef"), 4);
    assert_eq!(
        blocks,
        vec![
            "[C1] completed in 12s",
            "--- part 1/2 ---\nabcd",
            "--- part 2/2 ---\nef",
        ]
    );
}

#[test]
fn status_with_preview() {
    let event = SessionEvent::Status(StatusUpdate {
        channel_id: "C1".into(),
        session_id: "s1".into(),
        phrase: "running Bash".into(),
        elapsed_secs: 3,
        preview: "cargo test".into(),
    });
    assert_eq!(render_event(&event, 100), vec!["[C1] running Bash (3s)\ncargo test"]);
}

#[test]
fn authorization_request_shows_path_and_hint() {
    let request = PendingRequest::new(
        DecisionKind::Authorization,
        "Write".into(),
        Duration::from_secs(300),
    )
    .with_detail("create file")
    .with_path(Some("src/new.rs".into()));
    let event = SessionEvent::DecisionRequested {
        channel_id: "C1".into(),
        session_id: "s1".into(),
        request,
    };

    let blocks = render_event(&event, 100);
    assert_eq!(blocks.len(), 1);
    let block = &blocks[0];
    assert!(block.starts_with("[C1] permission requested: Write"));
    assert!(block.contains("path: src/new.rs"));
    assert!(block.contains("create file"));
    assert!(block.contains("expires in 300s"));
}

#[test]
fn settled_timeout_mentions_default() {
    let event = SessionEvent::DecisionSettled {
        channel_id: "C1".into(),
        session_id: "s1".into(),
        request_id: "r1".into(),
        kind: DecisionKind::Authorization,
        reply: "n".into(),
        timed_out: true,
    };
    assert_eq!(
        render_event(&event, 100),
        vec!["[C1] no answer in time; sent default `n`"]
    );
    assert_eq!(event.channel_id(), "C1");
}

#[test]
fn blank_input_prints_nothing_but_unbound_channel_gets_hint() {
    assert_eq!(render_dispatch("C1", &Dispatch::Ignored), None);
    assert_eq!(
        render_dispatch("C1", &Dispatch::Unbound),
        Some("[C1] channel is not bound; use `!bind <directory>`".to_owned())
    );
}

#[tokio::test]
async fn routed_messages_are_acknowledged() {
    assert_eq!(
        render_dispatch("C1", &Dispatch::Reply("Channel unbound.".into())),
        Some("[C1] Channel unbound.".to_owned())
    );
    assert_eq!(
        render_dispatch("C1", &Dispatch::Answered { request_id: "r1".into() }),
        None
    );

    let started = Dispatch::Started(tokio::spawn(async {}));
    assert_eq!(render_dispatch("C1", &started), Some("[C1] session queued".to_owned()));
}
