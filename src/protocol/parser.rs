//! Line classification for the `stream-json` output format.

use serde_json::{Map, Value};
use tracing::debug;

use super::{ParsedLine, StreamMessage};

/// Phrases that mark a tool error as an authorization denial.
///
/// Matched case-insensitively as substrings. This is a best-effort heuristic:
/// the CLI reports denials only as English error text.
pub const DENIAL_PHRASES: &[&str] = &[
    "permission",
    "haven't granted",
    "requires approval",
    "require approval",
    "was blocked",
    "command requires",
];

const UNKNOWN_TOOL: &str = "unknown tool";
const DEFAULT_QUESTION: &str = "Additional information is needed";

/// Whether `text` reads like an authorization denial.
#[must_use]
pub fn is_authorization_denial(text: &str) -> bool {
    let lowered = text.to_lowercase();
    DENIAL_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

/// Classify one line of CLI output.
///
/// Blank lines yield an empty [`ParsedLine`]. Lines that are not a JSON
/// object become [`StreamMessage::Unrecognized`] so diagnostic output is
/// never dropped.
#[must_use]
pub fn parse_line(line: &str) -> ParsedLine {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ParsedLine::default();
    }

    let Ok(Value::Object(record)) = serde_json::from_str::<Value>(trimmed) else {
        return ParsedLine {
            conversation_id: None,
            messages: vec![StreamMessage::Unrecognized(trimmed.to_owned())],
        };
    };

    ParsedLine {
        conversation_id: conversation_id(&record),
        messages: classify(&record),
    }
}

fn conversation_id(record: &Map<String, Value>) -> Option<String> {
    ["session_id", "sessionId"]
        .iter()
        .filter_map(|key| record.get(*key).and_then(Value::as_str))
        .find(|id| !id.is_empty())
        .map(str::to_owned)
}

fn classify(record: &Map<String, Value>) -> Vec<StreamMessage> {
    let kind = str_field(record, "type").unwrap_or_default();
    match kind {
        "system" => system_message(record).into_iter().collect(),
        "assistant" => content_items(record)
            .filter(|block| str_field(block, "type") == Some("text"))
            .map(|block| StreamMessage::Assistant(str_field(block, "text").unwrap_or_default().to_owned()))
            .collect(),
        "content_block_delta" => {
            let delta = object_field(record, "delta");
            match delta {
                Some(delta) if str_field(delta, "type") == Some("text_delta") => {
                    let text = str_field(delta, "text").unwrap_or_default();
                    vec![StreamMessage::DeltaText(text.to_owned())]
                }
                _ => Vec::new(),
            }
        }
        "content_block_start" => match object_field(record, "content_block") {
            Some(block) if str_field(block, "type") == Some("tool_use") => {
                let name = str_field(block, "name").unwrap_or(UNKNOWN_TOOL);
                vec![StreamMessage::ToolStart(name.to_owned())]
            }
            _ => Vec::new(),
        },
        "content_block_stop" => vec![StreamMessage::ToolStop],
        "result" => {
            let text = non_empty(str_field(record, "result"))
                .or_else(|| non_empty(str_field(record, "text")));
            text.map(|text| StreamMessage::Result(text.to_owned()))
                .into_iter()
                .collect()
        }
        "user" => tool_errors(record),
        other => {
            debug!(kind = other, "unhandled stream record");
            vec![StreamMessage::Unhandled(other.to_owned())]
        }
    }
}

fn system_message(record: &Map<String, Value>) -> Option<StreamMessage> {
    match str_field(record, "subtype").unwrap_or_default() {
        "init" => Some(StreamMessage::SystemInit),
        "permission_request" => {
            let nested = object_field(record, "permission");
            let lookup = |key: &str| {
                str_field(record, key).or_else(|| nested.and_then(|inner| str_field(inner, key)))
            };
            Some(StreamMessage::PermissionRequest {
                tool: lookup("tool").unwrap_or(UNKNOWN_TOOL).to_owned(),
                description: lookup("description").unwrap_or_default().to_owned(),
                path: non_empty(lookup("path")).map(str::to_owned),
            })
        }
        "input_request" => {
            let question = str_field(record, "question")
                .or_else(|| str_field(record, "message"))
                .unwrap_or(DEFAULT_QUESTION);
            Some(StreamMessage::InputRequest {
                question: question.to_owned(),
            })
        }
        other => {
            debug!(subtype = other, "unhandled system record");
            None
        }
    }
}

fn tool_errors(record: &Map<String, Value>) -> Vec<StreamMessage> {
    let mut messages = Vec::new();
    for item in content_items(record) {
        let is_error = item.get("is_error").and_then(Value::as_bool) == Some(true);
        if str_field(item, "type") != Some("tool_result") || !is_error {
            continue;
        }
        let text = tool_result_text(item.get("content"));
        let denied = is_authorization_denial(&text);
        messages.push(StreamMessage::ToolResultError(text.clone()));
        if denied {
            messages.push(StreamMessage::AuthorizationDenied(text));
        }
    }
    messages
}

/// Tool result content is either a string or a list of text blocks.
fn tool_result_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn content_items(record: &Map<String, Value>) -> impl Iterator<Item = &Map<String, Value>> {
    object_field(record, "message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn object_field<'a>(record: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    record.get(key).and_then(Value::as_object)
}

fn str_field<'a>(record: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.is_empty())
}
