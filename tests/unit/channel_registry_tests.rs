//! Unit tests for per-channel serialization and the live-session slot.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use agent_switchboard::driver::session::{SessionConfig, SessionDriver};
use agent_switchboard::orchestrator::ChannelRegistry;

fn idle_driver(channel_id: &str) -> Arc<SessionDriver> {
    let (tx, _rx) = mpsc::channel(4);
    let config = SessionConfig {
        channel_id: channel_id.into(),
        directory: PathBuf::from("."),
        host_cli: "true".into(),
        host_cli_args: Vec::new(),
        prior_conversation_id: None,
        auto_grant: false,
        attempt_timeout: Duration::from_secs(5),
        decision_timeout: Duration::from_secs(5),
        status_interval: Duration::from_millis(100),
        preview_chars: 100,
    };
    Arc::new(SessionDriver::new(config, tx))
}

// ── Session slot ────────────────────────────────────────────────────────────

#[tokio::test]
async fn permit_publishes_and_clears_session() {
    let registry = ChannelRegistry::new();
    let driver = idle_driver("C1");

    let permit = registry.acquire("C1").await;
    assert_eq!(permit.channel_id(), "C1");
    permit.set_session(Arc::clone(&driver));

    let live = registry.session("C1").expect("session registered");
    assert_eq!(live.id(), driver.id());

    drop(permit);
    assert!(registry.session("C1").is_none(), "dropping the permit clears the slot");
}

#[tokio::test]
async fn explicit_clear_session() {
    let registry = ChannelRegistry::new();
    let permit = registry.acquire("C1").await;
    permit.set_session(idle_driver("C1"));

    permit.clear_session();

    assert!(registry.session("C1").is_none());
}

#[tokio::test]
async fn idle_session_is_not_busy_and_cannot_be_aborted() {
    let registry = ChannelRegistry::new();
    let permit = registry.acquire("C1").await;
    permit.set_session(idle_driver("C1"));

    assert!(!registry.is_busy("C1"));
    assert!(!registry.abort("C1"));
    assert!(registry.active_channels().is_empty());
    assert_eq!(registry.active_count(), 0);
}

#[test]
fn unknown_channel_has_no_session() {
    let registry = ChannelRegistry::new();
    assert!(registry.session("nope").is_none());
    assert!(!registry.abort("nope"));
    registry.clear_session("nope");
}

// ── Serialization ───────────────────────────────────────────────────────────

#[tokio::test]
async fn waiters_are_served_in_arrival_order() {
    let registry = ChannelRegistry::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    let first = registry.acquire("C1").await;

    let mut handles = Vec::new();
    for label in ["second", "third"] {
        let registry = registry.clone();
        let order = Arc::clone(&order);
        handles.push(tokio::spawn(async move {
            let _permit = registry.acquire("C1").await;
            order.lock().unwrap().push(label);
        }));
        // Let the task reach the gate before the next one is spawned.
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    assert!(order.lock().unwrap().is_empty(), "waiters block while held");
    drop(first);
    for handle in handles {
        handle.await.expect("join");
    }

    assert_eq!(*order.lock().unwrap(), vec!["second", "third"]);
}

#[tokio::test]
async fn holders_never_overlap_in_one_channel() {
    let registry = ChannelRegistry::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let registry = registry.clone();
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let _permit = registry.acquire("C1").await;
                log.lock().unwrap().push("start");
                tokio::time::sleep(Duration::from_millis(30)).await;
                log.lock().unwrap().push("end");
            })
        })
        .collect();
    for task in tasks {
        task.await.expect("join");
    }

    assert_eq!(*log.lock().unwrap(), vec!["start", "end", "start", "end"]);
}

#[tokio::test]
async fn different_channels_run_concurrently() {
    let registry = ChannelRegistry::new();

    let _a = registry.acquire("A").await;
    let b = tokio::time::timeout(Duration::from_millis(200), registry.acquire("B")).await;

    assert!(b.is_ok(), "channel B must not wait on channel A");
}
