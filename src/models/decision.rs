//! Decision requests raised by the assistant CLI and the answers that settle them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Answer synthesized for a clarification nobody answered.
pub const CANCELLED_ANSWER: &str = "cancelled";

/// What the CLI is waiting for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Yes/no permission for a tool call.
    Authorization,
    /// Free-text answer to a question.
    Clarification,
}

/// Operator answer to a [`PendingRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Allow this one request.
    Grant,
    /// Allow this and every similar request for the rest of the attempt.
    GrantAll,
    /// Refuse the request.
    Deny,
    /// Free-text reply to a clarification.
    Text(String),
}

impl Answer {
    /// Line written to the terminal for this answer.
    #[must_use]
    pub fn reply(&self) -> &str {
        match self {
            Self::Grant => "y",
            Self::GrantAll => "yes!",
            Self::Deny => "n",
            Self::Text(text) => text,
        }
    }

    /// Whether the answer allows the requested action.
    #[must_use]
    pub fn is_grant(&self) -> bool {
        matches!(self, Self::Grant | Self::GrantAll)
    }

    /// Answer used when a request expires or is abandoned.
    #[must_use]
    pub fn default_for(kind: DecisionKind) -> Self {
        match kind {
            DecisionKind::Authorization => Self::Deny,
            DecisionKind::Clarification => Self::Text(CANCELLED_ANSWER.to_owned()),
        }
    }

    /// Interpret operator text as an authorization answer.
    ///
    /// Returns `None` when the text is not one of the accepted words.
    #[must_use]
    pub fn parse_authorization(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "y" | "yes" | "allow" => Some(Self::Grant),
            "a" | "all" | "yes!" => Some(Self::GrantAll),
            "n" | "no" | "deny" => Some(Self::Deny),
            _ => None,
        }
    }
}

/// One open decision point.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PendingRequest {
    /// Unique request identifier used to resolve it.
    pub id: String,
    /// Authorization or clarification.
    pub kind: DecisionKind,
    /// Text shown to the operator (tool name, question or denial text).
    pub subject: String,
    /// Optional description shown alongside the subject.
    pub detail: Option<String>,
    /// Path the request concerns, if any.
    pub path: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Moment after which the default answer applies.
    pub deadline: DateTime<Utc>,
    /// Time the operator has to answer.
    #[serde(skip)]
    pub timeout: Duration,
}

impl PendingRequest {
    /// Construct a request that expires `timeout` from now.
    #[must_use]
    pub fn new(kind: DecisionKind, subject: String, timeout: Duration) -> Self {
        let created_at = Utc::now();
        let ttl = chrono::Duration::from_std(timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(i64::from(u32::MAX)));
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            subject,
            detail: None,
            path: None,
            created_at,
            deadline: created_at
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            timeout,
        }
    }

    /// Attach a description.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        self.detail = (!detail.is_empty()).then_some(detail);
        self
    }

    /// Attach the path the request concerns.
    #[must_use]
    pub fn with_path(mut self, path: Option<String>) -> Self {
        self.path = path;
        self
    }
}
