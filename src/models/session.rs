//! Session state and outcome model.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Marker returned when an attempt produced no text at all.
pub const NO_OUTPUT: &str = "no output";

/// Lifecycle phase of a session driver.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Constructed, not started.
    #[default]
    Idle,
    /// Launching the CLI.
    Spawning,
    /// Reading protocol lines.
    Streaming,
    /// Suspended on an operator decision.
    AwaitingDecision,
    /// Stream ended; reaping the process and deciding whether to restart.
    Finishing,
    /// Settled successfully.
    Completed,
    /// Settled with an error.
    Failed,
    /// Cancelled from outside.
    Aborted,
}

impl SessionPhase {
    /// Whether the session has settled.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

/// Mutable state of one session, written only by its driver.
#[allow(clippy::struct_excessive_bools)] // Each flag is observed independently by status and dispatch.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SessionState {
    /// A CLI attempt is in progress.
    pub running: bool,
    /// An operator decision is outstanding. Implies `running`.
    pub waiting_decision: bool,
    /// The outstanding decision was raised by an authorization denial.
    pub waiting_permission: bool,
    /// Latest streamed assistant text.
    pub current_text: String,
    /// Tool currently executing.
    pub current_tool: Option<String>,
    /// Finalized result fragments, in arrival order.
    pub results: Vec<String>,
    /// Authorization denial texts observed this attempt.
    pub denials: Vec<String>,
    /// A grant arrived after the CLI already failed; restart before settling.
    pub restart_owed: bool,
    /// Current lifecycle phase.
    pub phase: SessionPhase,
    /// 1-based attempt number; 0 before the first spawn.
    pub attempt: u32,
}

impl SessionState {
    /// Fresh state for a new attempt, keeping only the attempt counter.
    #[must_use]
    pub fn for_attempt(attempt: u32) -> Self {
        Self {
            running: true,
            phase: SessionPhase::Spawning,
            attempt,
            ..Self::default()
        }
    }

    /// Text delivered when the attempt settles.
    ///
    /// Results joined in arrival order, else the last streamed text, else
    /// [`NO_OUTPUT`].
    #[must_use]
    pub fn final_text(&self) -> String {
        if !self.results.is_empty() {
            return self.results.join("\n");
        }
        if !self.current_text.is_empty() {
            return self.current_text.clone();
        }
        NO_OUTPUT.to_owned()
    }
}

/// How a session settled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The CLI finished cleanly or produced a result.
    Completed,
    /// Spawn failure, timeout, denial or non-zero exit.
    Failed,
    /// Cancelled by an operator.
    Aborted,
}

/// Final report of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Settlement status.
    pub status: OutcomeStatus,
    /// Human-readable final text.
    pub text: String,
    /// Wall time since `start`.
    pub elapsed: Duration,
    /// Conversation identity first observed in this attempt chain.
    pub conversation_id: Option<String>,
}

impl SessionOutcome {
    /// Whether the session completed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == OutcomeStatus::Completed
    }

    /// Elapsed whole seconds.
    #[must_use]
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed.as_secs()
    }
}
