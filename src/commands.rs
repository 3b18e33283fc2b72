//! Operator commands (`!bind`, `!abort`, ...).
//!
//! Commands manage the channel binding store and the live session of the
//! channel they are sent in. Each returns the text to show the operator.

use std::fmt::Write as _;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::orchestrator::channel_registry::ChannelRegistry;
use crate::persistence::channel_repo::ChannelRepo;
use crate::Result;

/// Prefix that marks a message as a command.
pub const COMMAND_PREFIX: char = '!';

/// Parsed operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Bind the channel to a directory.
    Bind(String),
    /// Remove the channel binding.
    Unbind,
    /// Abort the running session.
    Abort,
    /// Forget the stored conversation.
    Reset,
    /// Show (`None`) or set the auto-grant policy.
    Permissions(Option<String>),
    /// Show channel details.
    Info,
    /// List all bindings.
    List,
    /// Show usage.
    Help,
    /// Anything else starting with the prefix.
    Unknown(String),
}

impl Command {
    /// Parse `text` as a command. Returns `None` for ordinary messages.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let body = text.trim().strip_prefix(COMMAND_PREFIX)?;
        let (name, arg) = match body.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (body, ""),
        };
        let arg = (!arg.is_empty()).then(|| arg.to_owned());

        Some(match name.to_lowercase().as_str() {
            "bind" => Self::Bind(arg.unwrap_or_default()),
            "unbind" => Self::Unbind,
            "abort" | "stop" => Self::Abort,
            "reset" => Self::Reset,
            "permissions" | "perms" => Self::Permissions(arg),
            "info" => Self::Info,
            "list" => Self::List,
            "help" => Self::Help,
            _ => Self::Unknown(name.to_owned()),
        })
    }
}

/// Execute `command` for `channel_id`.
///
/// # Errors
///
/// Returns `AppError::Db` if the binding store fails.
pub async fn execute(
    command: Command,
    channel_id: &str,
    repo: &ChannelRepo,
    registry: &ChannelRegistry,
) -> Result<String> {
    info!(channel_id, ?command, "operator command");
    match command {
        Command::Bind(raw) => bind(channel_id, &raw, repo).await,
        Command::Unbind => Ok(if repo.unbind(channel_id).await? {
            "Channel unbound.".to_owned()
        } else {
            "This channel is not bound to a directory.".to_owned()
        }),
        Command::Abort => Ok(if registry.abort(channel_id) {
            "Session aborted.".to_owned()
        } else {
            "No session is running.".to_owned()
        }),
        Command::Reset => Ok(if repo.clear_conversation_id(channel_id).await? {
            "Conversation reset. The next message starts a new conversation.".to_owned()
        } else {
            "No stored conversation for this channel.".to_owned()
        }),
        Command::Permissions(mode) => permissions(channel_id, mode.as_deref(), repo).await,
        Command::Info => info(channel_id, repo, registry).await,
        Command::List => list(repo, registry).await,
        Command::Help => Ok(help()),
        Command::Unknown(name) => Ok(format!("Unknown command `!{name}`. Try `!help`.")),
    }
}

async fn bind(channel_id: &str, raw: &str, repo: &ChannelRepo) -> Result<String> {
    if raw.is_empty() {
        return Ok("Usage: `!bind <directory>`".to_owned());
    }
    let directory = expand_home(raw);
    if !directory.is_dir() {
        return Ok(format!("Directory not found: `{}`", directory.display()));
    }
    let directory = directory.canonicalize().unwrap_or(directory);
    let binding = repo.bind(channel_id, &directory).await?;
    info!(channel_id, directory = %binding.directory.display(), "channel bound");
    Ok(format!("Channel bound to `{}`", binding.directory.display()))
}

async fn permissions(channel_id: &str, mode: Option<&str>, repo: &ChannelRepo) -> Result<String> {
    let Some(binding) = repo.get(channel_id).await? else {
        return Ok("This channel is not bound to a directory.".to_owned());
    };

    let enable = match mode.map(str::to_lowercase).as_deref() {
        None => {
            let current = if binding.auto_grant {
                "on (tools run without asking)"
            } else {
                "off (each tool asks first)"
            };
            return Ok(format!(
                "Auto-grant is {current}. Change with `!permissions on` or `!permissions off`."
            ));
        }
        Some("on" | "auto" | "true") => true,
        Some("off" | "manual" | "false") => false,
        Some(_) => return Ok("Expected `on` or `off`.".to_owned()),
    };

    repo.set_auto_grant(channel_id, enable).await?;
    if enable {
        warn!(channel_id, "auto-grant enabled");
        Ok("Auto-grant is on. The assistant will read, write and run commands without asking; use it only with trusted projects.".to_owned())
    } else {
        info!(channel_id, "auto-grant disabled");
        Ok("Auto-grant is off. Each tool call asks for approval.".to_owned())
    }
}

async fn info(channel_id: &str, repo: &ChannelRepo, registry: &ChannelRegistry) -> Result<String> {
    let Some(binding) = repo.get(channel_id).await? else {
        return Ok("This channel is not bound. Use `!bind <directory>`.".to_owned());
    };

    let status = match registry.session(channel_id) {
        Some(session) if session.is_waiting_decision() => "waiting for input",
        Some(session) if session.is_running() => "running",
        _ => "idle",
    };
    let policy = if binding.auto_grant { "auto-grant" } else { "ask each time" };
    let conversation = binding.conversation_id.as_deref().map_or_else(
        || "none (next message starts a new conversation)".to_owned(),
        |id| format!("{}... (resumed on next message)", id.chars().take(8).collect::<String>()),
    );

    Ok(format!(
        "Directory: `{}`\nStatus: {status}\nPermissions: {policy}\nConversation: {conversation}",
        binding.directory.display()
    ))
}

async fn list(repo: &ChannelRepo, registry: &ChannelRegistry) -> Result<String> {
    let bindings = repo.list().await?;
    if bindings.is_empty() {
        return Ok("No channels are bound.".to_owned());
    }
    let mut out = String::from("Bound channels:");
    for binding in bindings {
        let marker = if registry.is_busy(&binding.channel_id) { "running" } else { "idle" };
        let _ = write!(
            out,
            "\n- {} [{marker}] `{}`",
            binding.channel_id,
            binding.directory.display()
        );
    }
    Ok(out)
}

fn help() -> String {
    [
        "Commands:",
        "`!bind <directory>` bind this channel to a directory",
        "`!unbind` remove the binding",
        "`!abort` stop the running session",
        "`!reset` start a new conversation on the next message",
        "`!permissions [on|off]` show or set auto-grant",
        "`!info` show channel details",
        "`!list` list all bindings",
        "Any other message is sent to the assistant. While it waits for a decision, reply `y`, `a` (allow all) or `n`, or type the answer to its question.",
    ]
    .join("\n")
}

/// Expand a leading `~` to `$HOME`.
#[must_use]
pub fn expand_home(raw: &str) -> PathBuf {
    let raw = raw.trim();
    match (raw.strip_prefix('~'), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            PathBuf::from(home).join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(raw),
    }
}
