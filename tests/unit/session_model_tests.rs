//! Unit tests for session state, outcomes and status previews.

use std::time::Duration;

use agent_switchboard::driver::session::preview;
use agent_switchboard::models::session::{
    OutcomeStatus, SessionOutcome, SessionPhase, SessionState, NO_OUTPUT,
};

// ── Final text ──────────────────────────────────────────────────────────────

#[test]
fn results_are_joined_in_arrival_order() {
    let state = SessionState {
        results: vec!["one".into(), "two".into()],
        current_text: "ignored".into(),
        ..SessionState::default()
    };
    assert_eq!(state.final_text(), "one\ntwo");
}

#[test]
fn streamed_text_is_used_without_results() {
    let state = SessionState {
        current_text: "partial answer".into(),
        ..SessionState::default()
    };
    assert_eq!(state.final_text(), "partial answer");
}

#[test]
fn empty_attempt_reports_no_output() {
    assert_eq!(SessionState::default().final_text(), NO_OUTPUT);
}

// ── Attempt reset ───────────────────────────────────────────────────────────

#[test]
fn for_attempt_starts_clean() {
    let state = SessionState::for_attempt(2);

    assert!(state.running);
    assert_eq!(state.attempt, 2);
    assert_eq!(state.phase, SessionPhase::Spawning);
    assert!(state.results.is_empty());
    assert!(state.denials.is_empty());
    assert!(!state.restart_owed);
    assert!(!state.waiting_decision);
}

#[test]
fn terminal_phases() {
    assert!(SessionPhase::Completed.is_terminal());
    assert!(SessionPhase::Failed.is_terminal());
    assert!(SessionPhase::Aborted.is_terminal());
    assert!(!SessionPhase::AwaitingDecision.is_terminal());
    assert!(!SessionPhase::Idle.is_terminal());
}

// ── Outcome ─────────────────────────────────────────────────────────────────

#[test]
fn outcome_success_and_elapsed() {
    let outcome = SessionOutcome {
        status: OutcomeStatus::Completed,
        text: "done".into(),
        elapsed: Duration::from_millis(2_900),
        conversation_id: None,
    };
    assert!(outcome.success());
    assert_eq!(outcome.elapsed_secs(), 2);

    let failed = SessionOutcome {
        status: OutcomeStatus::Failed,
        ..outcome
    };
    assert!(!failed.success());
}

// ── Preview ─────────────────────────────────────────────────────────────────

#[test]
fn short_preview_is_unchanged() {
    assert_eq!(preview("hello", 800), "hello");
}

#[test]
fn long_preview_keeps_the_tail() {
    let text = "a".repeat(10) + "tail";
    assert_eq!(preview(&text, 4), "...\ntail");
}

#[test]
fn preview_counts_characters_not_bytes() {
    assert_eq!(preview("ééééé", 2), "...\néé");
}
