//! Per-channel serialization and live-session slot.
//!
//! Every channel gets a FIFO gate (`tokio::sync::Mutex<()>`) and at most one
//! live [`SessionDriver`]. Holding a [`ChannelPermit`] is the only way to run
//! a session; the permit clears the channel's session slot when dropped, so
//! the next holder always starts from a clean slate, whatever way the
//! previous session ended.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

use crate::driver::session::SessionDriver;

#[derive(Debug, Default)]
struct ChannelEntry {
    gate: Arc<tokio::sync::Mutex<()>>,
    session: Option<Arc<SessionDriver>>,
}

/// Owned registry of channel gates and live sessions.
///
/// Cheap to clone; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    entries: Arc<Mutex<HashMap<String, ChannelEntry>>>,
}

/// Exclusive right to run a session in one channel.
#[derive(Debug)]
pub struct ChannelPermit {
    channel_id: String,
    registry: ChannelRegistry,
    _guard: OwnedMutexGuard<()>,
}

impl ChannelPermit {
    /// Channel this permit is for.
    #[must_use]
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Publish `session` as the channel's live session.
    pub fn set_session(&self, session: Arc<SessionDriver>) {
        let mut entries = self.registry.lock();
        let entry = entries.entry(self.channel_id.clone()).or_default();
        debug!(channel_id = %self.channel_id, session_id = %session.id(), "session registered");
        entry.session = Some(session);
    }

    /// Withdraw the channel's live session.
    pub fn clear_session(&self) {
        self.registry.clear_session(&self.channel_id);
    }
}

impl Drop for ChannelPermit {
    fn drop(&mut self) {
        // Runs before `_guard` is released.
        self.registry.clear_session(&self.channel_id);
        debug!(channel_id = %self.channel_id, "channel released");
    }
}

impl ChannelRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `channel_id`. Waiters are served in order.
    pub async fn acquire(&self, channel_id: &str) -> ChannelPermit {
        let gate = {
            let mut entries = self.lock();
            Arc::clone(&entries.entry(channel_id.to_owned()).or_default().gate)
        };
        let guard = gate.lock_owned().await;
        debug!(channel_id, "channel acquired");
        ChannelPermit {
            channel_id: channel_id.to_owned(),
            registry: self.clone(),
            _guard: guard,
        }
    }

    /// Live session in `channel_id`, if any.
    #[must_use]
    pub fn session(&self, channel_id: &str) -> Option<Arc<SessionDriver>> {
        self.lock()
            .get(channel_id)
            .and_then(|entry| entry.session.clone())
    }

    /// Withdraw the live session of `channel_id`, if any.
    pub fn clear_session(&self, channel_id: &str) {
        if let Some(entry) = self.lock().get_mut(channel_id) {
            entry.session = None;
        }
    }

    /// Abort the live session of `channel_id`.
    ///
    /// Returns `false` if no running session exists. Safe to call while the
    /// session is blocked reading output or awaiting a decision.
    pub fn abort(&self, channel_id: &str) -> bool {
        match self.session(channel_id) {
            Some(session) if session.is_running() => {
                info!(channel_id, session_id = %session.id(), "aborting session");
                session.abort();
                true
            }
            _ => false,
        }
    }

    /// Whether `channel_id` has a running session.
    #[must_use]
    pub fn is_busy(&self, channel_id: &str) -> bool {
        self.session(channel_id)
            .is_some_and(|session| session.is_running())
    }

    /// Channels with a running session, sorted.
    #[must_use]
    pub fn active_channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, entry)| entry.session.as_ref().is_some_and(|s| s.is_running()))
            .map(|(channel_id, _)| channel_id.clone())
            .collect();
        channels.sort();
        channels
    }

    /// Number of running sessions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active_channels().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ChannelEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
