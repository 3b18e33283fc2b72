//! Session driver: runs the assistant CLI and reports what happens.
//!
//! A [`session::SessionDriver`] owns one CLI process at a time, classifies its
//! output, suspends on decision points through a
//! [`coordinator::RequestCoordinator`], and restarts the CLI with auto-grant
//! when a grant arrives after a tool call was already denied. Everything a
//! surface needs to render is published as a [`SessionEvent`].

pub mod attempt;
pub mod coordinator;
pub mod session;
pub mod throttle;

use std::time::Duration;

use tokio::time::Instant;

use crate::models::decision::{DecisionKind, PendingRequest};
use crate::models::session::SessionOutcome;

/// Stand-in for "never" when a deadline cannot be represented.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `from + span`, clamped to a far-future instant instead of overflowing.
#[must_use]
pub fn deadline_after(from: Instant, span: Duration) -> Instant {
    from.checked_add(span)
        .or_else(|| from.checked_add(FAR_FUTURE))
        .unwrap_or(from)
}

/// Throttled progress report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Channel the session runs in.
    pub channel_id: String,
    /// Short local session identifier.
    pub session_id: String,
    /// What the session is doing, e.g. `running Bash`.
    pub phrase: String,
    /// Whole seconds since the session started.
    pub elapsed_secs: u64,
    /// Trailing slice of the current streamed text.
    pub preview: String,
}

/// Events emitted by session drivers into the shared event channel.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Periodic progress.
    Status(StatusUpdate),
    /// The CLI needs an operator decision.
    DecisionRequested {
        /// Channel the session runs in.
        channel_id: String,
        /// Short local session identifier.
        session_id: String,
        /// The open request; answer it by `request.id`.
        request: PendingRequest,
    },
    /// A decision was answered, defaulted or abandoned.
    DecisionSettled {
        /// Channel the session runs in.
        channel_id: String,
        /// Short local session identifier.
        session_id: String,
        /// Request that settled.
        request_id: String,
        /// Kind of the settled request.
        kind: DecisionKind,
        /// Reply that was applied.
        reply: String,
        /// The deadline elapsed and the default answer applied.
        timed_out: bool,
    },
    /// A grant arrived after a denial; the CLI is being relaunched.
    Restarting {
        /// Channel the session runs in.
        channel_id: String,
        /// Short local session identifier.
        session_id: String,
        /// Attempt number about to start.
        attempt: u32,
    },
    /// The session settled.
    Finished {
        /// Channel the session ran in.
        channel_id: String,
        /// Short local session identifier.
        session_id: String,
        /// Final report.
        outcome: SessionOutcome,
    },
}

impl SessionEvent {
    /// Channel the event belongs to.
    #[must_use]
    pub fn channel_id(&self) -> &str {
        match self {
            Self::Status(update) => &update.channel_id,
            Self::DecisionRequested { channel_id, .. }
            | Self::DecisionSettled { channel_id, .. }
            | Self::Restarting { channel_id, .. }
            | Self::Finished { channel_id, .. } => channel_id,
        }
    }
}
