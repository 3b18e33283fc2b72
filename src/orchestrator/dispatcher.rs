//! Inbound message routing.
//!
//! Every operator message for a channel goes through
//! [`Dispatcher::handle_message`], which decides whether it is a command, an
//! answer to an open decision, a message for a busy channel, or the prompt of
//! a new session.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::commands::{self, Command};
use crate::config::GlobalConfig;
use crate::driver::session::{SessionConfig, SessionDriver};
use crate::driver::SessionEvent;
use crate::models::decision::{Answer, DecisionKind, PendingRequest};
use crate::persistence::channel_repo::ChannelRepo;
use crate::Result;

use super::channel_registry::ChannelRegistry;

const BUSY_REPLY: &str = "A session is already running in this channel. Wait for it to finish or use `!abort`.";
const AUTHORIZATION_HINT: &str =
    "Reply `y` to allow, `a` to allow all for this run, or `n` to deny.";

/// What happened to an inbound message.
#[derive(Debug)]
pub enum Dispatch {
    /// Text to show the operator (command output, hints, busy notice).
    Reply(String),
    /// The message answered the open decision.
    Answered {
        /// Request that was answered.
        request_id: String,
    },
    /// A session was queued; the handle completes when it has settled.
    Started(JoinHandle<()>),
    /// The channel is not bound; the message was dropped.
    Unbound,
    /// Blank input; nothing to do.
    Ignored,
}

/// Routes operator messages to commands, decisions and new sessions.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<GlobalConfig>,
    registry: ChannelRegistry,
    repo: ChannelRepo,
    events: mpsc::Sender<SessionEvent>,
}

impl Dispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(
        config: Arc<GlobalConfig>,
        registry: ChannelRegistry,
        repo: ChannelRepo,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            config,
            registry,
            repo,
            events,
        }
    }

    /// Channel registry shared with this dispatcher.
    #[must_use]
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Route one operator message.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the binding store fails.
    pub async fn handle_message(&self, channel_id: &str, text: &str) -> Result<Dispatch> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Dispatch::Ignored);
        }

        if let Some(command) = Command::parse(text) {
            let reply = commands::execute(command, channel_id, &self.repo, &self.registry).await?;
            return Ok(Dispatch::Reply(reply));
        }

        if self.repo.get(channel_id).await?.is_none() {
            debug!(channel_id, "message for unbound channel ignored");
            return Ok(Dispatch::Unbound);
        }

        if let Some(session) = self.registry.session(channel_id) {
            if let Some(request) = session.pending().await {
                return Ok(answer(&session, &request, text).await);
            }
            if session.is_running() {
                return Ok(Dispatch::Reply(BUSY_REPLY.to_owned()));
            }
        }

        Ok(Dispatch::Started(self.spawn_session(channel_id, text)))
    }

    fn spawn_session(&self, channel_id: &str, prompt: &str) -> JoinHandle<()> {
        let this = self.clone();
        let channel_id = channel_id.to_owned();
        let prompt = prompt.to_owned();
        let span = info_span!("dispatch", channel_id = %channel_id);
        tokio::spawn(async move { this.run_session(&channel_id, &prompt).await }.instrument(span))
    }

    async fn run_session(&self, channel_id: &str, prompt: &str) {
        let permit = self.registry.acquire(channel_id).await;

        // Read the binding under the permit so a queued session sees the
        // conversation id its predecessor stored.
        let binding = match self.repo.get(channel_id).await {
            Ok(Some(binding)) => binding,
            Ok(None) => {
                info!("channel unbound while the session was queued");
                return;
            }
            Err(err) => {
                error!(%err, "failed to load channel binding");
                return;
            }
        };

        let config = SessionConfig::from_global(&self.config, channel_id, binding.directory.clone())
            .with_conversation(binding.conversation_id.clone())
            .with_auto_grant(binding.auto_grant);
        let driver = Arc::new(SessionDriver::new(config, self.events.clone()));
        // Marked running before it becomes visible in the channel slot.
        let run = driver.start(prompt);
        permit.set_session(Arc::clone(&driver));
        info!(
            session_id = %driver.id(),
            resume = binding.conversation_id.is_some(),
            auto_grant = binding.auto_grant,
            "session starting"
        );

        let outcome = run.await;

        if let Some(id) = &outcome.conversation_id {
            if binding.conversation_id.as_deref() != Some(id.as_str()) {
                match self.repo.set_conversation_id(channel_id, id).await {
                    Ok(()) => info!(conversation_id = %id, "conversation identity stored"),
                    Err(err) => warn!(%err, "failed to store conversation identity"),
                }
            }
        }

        let event = SessionEvent::Finished {
            channel_id: channel_id.to_owned(),
            session_id: driver.id().to_owned(),
            outcome,
        };
        if self.events.send(event).await.is_err() {
            debug!("event receiver gone; result not delivered");
        }
        drop(permit);
    }
}

/// Apply operator text to the open decision of `session`.
async fn answer(session: &SessionDriver, request: &PendingRequest, text: &str) -> Dispatch {
    let answer = match request.kind {
        DecisionKind::Clarification => Answer::Text(text.to_owned()),
        DecisionKind::Authorization => match Answer::parse_authorization(text) {
            Some(answer) => answer,
            None => return Dispatch::Reply(AUTHORIZATION_HINT.to_owned()),
        },
    };

    if session.resolve(&request.id, answer).await {
        Dispatch::Answered {
            request_id: request.id.clone(),
        }
    } else {
        Dispatch::Reply("That request is no longer open.".to_owned())
    }
}
