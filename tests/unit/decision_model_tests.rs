//! Unit tests for decision requests and answers.

use std::time::Duration;

use agent_switchboard::models::decision::{Answer, DecisionKind, PendingRequest, CANCELLED_ANSWER};

#[test]
fn answer_replies_match_terminal_vocabulary() {
    assert_eq!(Answer::Grant.reply(), "y");
    assert_eq!(Answer::GrantAll.reply(), "yes!");
    assert_eq!(Answer::Deny.reply(), "n");
    assert_eq!(Answer::Text("use main".into()).reply(), "use main");
}

#[test]
fn grant_classification() {
    assert!(Answer::Grant.is_grant());
    assert!(Answer::GrantAll.is_grant());
    assert!(!Answer::Deny.is_grant());
    assert!(!Answer::Text("y".into()).is_grant());
}

#[test]
fn defaults_per_kind() {
    assert_eq!(Answer::default_for(DecisionKind::Authorization), Answer::Deny);
    assert_eq!(
        Answer::default_for(DecisionKind::Clarification),
        Answer::Text(CANCELLED_ANSWER.into())
    );
}

#[test]
fn parse_authorization_words() {
    for word in ["y", "YES", " allow "] {
        assert_eq!(Answer::parse_authorization(word), Some(Answer::Grant), "{word}");
    }
    for word in ["a", "All", "yes!"] {
        assert_eq!(Answer::parse_authorization(word), Some(Answer::GrantAll), "{word}");
    }
    for word in ["n", "No", "deny"] {
        assert_eq!(Answer::parse_authorization(word), Some(Answer::Deny), "{word}");
    }
    assert_eq!(Answer::parse_authorization("maybe"), None);
}

#[test]
fn pending_request_deadline_follows_timeout() {
    let request = PendingRequest::new(
        DecisionKind::Authorization,
        "Bash".into(),
        Duration::from_secs(300),
    );

    assert_eq!((request.deadline - request.created_at).num_seconds(), 300);
    assert_eq!(request.timeout, Duration::from_secs(300));
    assert!(!request.id.is_empty());
}

#[test]
fn huge_timeouts_saturate_the_deadline() {
    for timeout in [Duration::from_secs(1_000_000_000_000_000), Duration::MAX] {
        let request = PendingRequest::new(DecisionKind::Clarification, "q".into(), timeout);

        assert!(request.deadline > request.created_at);
        assert_eq!(request.timeout, timeout);
    }
}

#[test]
fn empty_detail_is_dropped() {
    let request = PendingRequest::new(
        DecisionKind::Authorization,
        "Write".into(),
        Duration::from_secs(1),
    )
    .with_detail("")
    .with_path(Some("src/lib.rs".into()));

    assert_eq!(request.detail, None);
    assert_eq!(request.path.as_deref(), Some("src/lib.rs"));
}

#[test]
fn request_ids_are_unique() {
    let a = PendingRequest::new(DecisionKind::Clarification, "q".into(), Duration::from_secs(1));
    let b = PendingRequest::new(DecisionKind::Clarification, "q".into(), Duration::from_secs(1));
    assert_ne!(a.id, b.id);
}
