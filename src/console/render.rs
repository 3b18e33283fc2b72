//! Plain-text rendering of session events.

use std::fmt::Write as _;

use crate::driver::SessionEvent;
use crate::models::decision::DecisionKind;
use crate::models::session::OutcomeStatus;
use crate::orchestrator::Dispatch;

/// Render `event` as one or more text blocks.
///
/// Final output longer than `max_output_length` characters is split into
/// several blocks.
#[must_use]
pub fn render_event(event: &SessionEvent, max_output_length: usize) -> Vec<String> {
    match event {
        SessionEvent::Status(update) => {
            let mut block = format!(
                "[{}] {} ({}s)",
                update.channel_id, update.phrase, update.elapsed_secs
            );
            if !update.preview.is_empty() {
                block.push('\n');
                block.push_str(&update.preview);
            }
            vec![block]
        }
        SessionEvent::DecisionRequested {
            channel_id,
            request,
            ..
        } => {
            let mut block = match request.kind {
                DecisionKind::Authorization => {
                    format!("[{channel_id}] permission requested: {}", request.subject)
                }
                DecisionKind::Clarification => {
                    format!("[{channel_id}] question: {}", request.subject)
                }
            };
            if let Some(path) = &request.path {
                let _ = write!(block, "\n  path: {path}");
            }
            if let Some(detail) = &request.detail {
                let _ = write!(block, "\n  {detail}");
            }
            let hint = match request.kind {
                DecisionKind::Authorization => "reply y (allow), a (allow all) or n (deny)",
                DecisionKind::Clarification => "type your answer",
            };
            let _ = write!(
                block,
                "\n  {hint}; expires in {}s",
                request.timeout.as_secs()
            );
            vec![block]
        }
        SessionEvent::DecisionSettled {
            channel_id,
            reply,
            timed_out,
            ..
        } => {
            let block = if *timed_out {
                format!("[{channel_id}] no answer in time; sent default `{reply}`")
            } else {
                format!("[{channel_id}] answer sent: `{reply}`")
            };
            vec![block]
        }
        SessionEvent::Restarting {
            channel_id,
            attempt,
            ..
        } => vec![format!(
            "[{channel_id}] permission granted; restarting (attempt {attempt})"
        )],
        SessionEvent::Finished {
            channel_id,
            outcome,
            ..
        } => {
            let label = match outcome.status {
                OutcomeStatus::Completed => "completed",
                OutcomeStatus::Failed => "failed",
                OutcomeStatus::Aborted => "aborted",
            };
            let chunks = split_output(&outcome.text, max_output_length);
            let total = chunks.len();
            let mut blocks = vec![format!(
                "[{channel_id}] {label} in {}s",
                outcome.elapsed_secs()
            )];
            blocks.extend(chunks.into_iter().enumerate().map(|(index, chunk)| {
                if total > 1 {
                    format!("--- part {}/{total} ---\n{chunk}", index + 1)
                } else {
                    chunk
                }
            }));
            blocks
        }
    }
}

/// Console line acknowledging how a message was routed, if any.
#[must_use]
pub fn render_dispatch(channel_id: &str, dispatch: &Dispatch) -> Option<String> {
    match dispatch {
        Dispatch::Reply(reply) => Some(format!("[{channel_id}] {reply}")),
        Dispatch::Started(_) => Some(format!("[{channel_id}] session queued")),
        Dispatch::Unbound => Some(format!(
            "[{channel_id}] channel is not bound; use `!bind <directory>`"
        )),
        Dispatch::Answered { .. } | Dispatch::Ignored => None,
    }
}

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Always returns at least one chunk. A limit of zero disables splitting.
#[must_use]
pub fn split_output(text: &str, max_chars: usize) -> Vec<String> {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return vec![text.to_owned()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
