//! Assistant CLI streaming protocol.
//!
//! The CLI emits one JSON record per stdout line. [`parser::parse_line`]
//! turns each line into a [`ParsedLine`]: the conversation identity carried by
//! the record (if any) plus zero or more [`StreamMessage`] values that drive
//! the session state machine.

pub mod parser;

pub use parser::{is_authorization_denial, parse_line, DENIAL_PHRASES};

/// One classified protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    /// A complete assistant text block; replaces the current fragment.
    Assistant(String),
    /// Incremental assistant text; appended to the current fragment.
    DeltaText(String),
    /// A tool invocation began.
    ToolStart(String),
    /// The running tool finished.
    ToolStop,
    /// A finalized result fragment.
    Result(String),
    /// The CLI finished initializing.
    SystemInit,
    /// The CLI asks whether a tool may run.
    PermissionRequest {
        /// Tool requesting permission.
        tool: String,
        /// Human-readable description of the action.
        description: String,
        /// Path the tool wants to touch, if any.
        path: Option<String>,
    },
    /// The CLI needs free-text input from the operator.
    InputRequest {
        /// Question to show the operator.
        question: String,
    },
    /// A tool call failed.
    ToolResultError(String),
    /// A tool call failed because it was not authorized.
    ///
    /// Always emitted right after the matching [`StreamMessage::ToolResultError`].
    AuthorizationDenied(String),
    /// The line was not JSON; carried as plain text.
    Unrecognized(String),
    /// Valid JSON whose record type is not understood.
    Unhandled(String),
}

/// Everything extracted from one output line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLine {
    /// Conversation identity found on the record, independent of its type.
    pub conversation_id: Option<String>,
    /// Messages in the order they appear in the record.
    pub messages: Vec<StreamMessage>,
}
