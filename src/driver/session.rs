//! Session state machine.
//!
//! `Idle → Spawning → Streaming ⇄ AwaitingDecision → Finishing → {Completed,
//! Failed, Aborted}`, with `Finishing → Spawning` when a restart is owed.
//!
//! One [`SessionDriver`] runs one operator prompt to completion. It is the
//! only writer of its [`SessionState`]; other tasks observe it through the
//! read-only getters and answer decisions through [`SessionDriver::resolve`].
//! [`SessionDriver::abort`] may be called from any task at any time.

use std::future::Future;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::GlobalConfig;
use crate::models::decision::{Answer, DecisionKind, PendingRequest};
use crate::models::session::{OutcomeStatus, SessionOutcome, SessionPhase, SessionState};
use crate::protocol::{parse_line, StreamMessage};
use crate::terminal::process::{PtyProcess, SpawnSpec};
use crate::{AppError, Result};

use super::attempt::AttemptPlan;
use super::coordinator::{RequestCoordinator, Resolution};
use super::throttle::StatusThrottle;
use super::{deadline_after, SessionEvent, StatusUpdate};

/// Attempts per session, counting the first launch.
pub const MAX_ATTEMPTS: u32 = 2;

const ABORTED_TEXT: &str = "session aborted";
const DENIAL_DETAIL: &str = "Grant to allow the tool and continue the task; deny to stop.";

/// Launch parameters for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Channel the session belongs to.
    pub channel_id: String,
    /// Working directory; validated before spawning.
    pub directory: PathBuf,
    /// CLI executable.
    pub host_cli: String,
    /// Arguments placed before the session flags.
    pub host_cli_args: Vec<String>,
    /// Conversation from a previous session to resume.
    pub prior_conversation_id: Option<String>,
    /// Start with every tool pre-authorized.
    pub auto_grant: bool,
    /// Per-attempt budget, not counting time awaiting decisions.
    pub attempt_timeout: Duration,
    /// Deadline for each decision.
    pub decision_timeout: Duration,
    /// Minimum gap between status reports.
    pub status_interval: Duration,
    /// Trailing characters included in status previews.
    pub preview_chars: usize,
}

impl SessionConfig {
    /// Derive a session configuration from the global settings.
    #[must_use]
    pub fn from_global(config: &GlobalConfig, channel_id: impl Into<String>, directory: PathBuf) -> Self {
        Self {
            channel_id: channel_id.into(),
            directory,
            host_cli: config.host_cli.clone(),
            host_cli_args: config.host_cli_args.clone(),
            prior_conversation_id: None,
            auto_grant: false,
            attempt_timeout: config.session_timeout(),
            decision_timeout: config.decision_timeout(),
            status_interval: config.status_interval(),
            preview_chars: config.status.preview_chars,
        }
    }

    /// Resume `conversation_id` on the first attempt.
    #[must_use]
    pub fn with_conversation(mut self, conversation_id: Option<String>) -> Self {
        self.prior_conversation_id = conversation_id;
        self
    }

    /// Set the initial authorization policy.
    #[must_use]
    pub fn with_auto_grant(mut self, auto_grant: bool) -> Self {
        self.auto_grant = auto_grant;
        self
    }
}

/// How one attempt ended.
enum AttemptReport {
    /// Stream ended normally.
    Finished { status: OutcomeStatus, text: String },
    /// A denial was granted; relaunch with auto-grant.
    RestartOwed { denial: String },
    /// A denial was refused or expired.
    Declined { denial: String },
    /// Cancelled from outside.
    Aborted,
}

/// Whether the read loop keeps going after a message.
enum Flow {
    Continue,
    Abort,
}

/// Resources owned by one attempt.
struct Attempt {
    process: PtyProcess,
    throttle: StatusThrottle,
    deadline: Instant,
    denial_prompted: bool,
    declined: Option<String>,
}

/// Drives one assistant CLI session through its state machine.
#[derive(Debug)]
pub struct SessionDriver {
    id: String,
    config: SessionConfig,
    state: watch::Sender<SessionState>,
    conversation_id: OnceLock<String>,
    coordinator: RequestCoordinator,
    cancel: CancellationToken,
    events: mpsc::Sender<SessionEvent>,
    started_at: OnceLock<Instant>,
}

impl SessionDriver {
    /// Create an idle driver.
    #[must_use]
    pub fn new(config: SessionConfig, events: mpsc::Sender<SessionEvent>) -> Self {
        let id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let coordinator =
            RequestCoordinator::new(config.channel_id.clone(), id.clone(), events.clone());
        let (state, _) = watch::channel(SessionState::default());
        Self {
            id,
            config,
            state,
            conversation_id: OnceLock::new(),
            coordinator,
            cancel: CancellationToken::new(),
            events,
            started_at: OnceLock::new(),
        }
    }

    /// Short local session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Channel this session runs in.
    #[must_use]
    pub fn channel_id(&self) -> &str {
        &self.config.channel_id
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Watch state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Whether an attempt is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.borrow().running
    }

    /// Whether a decision is outstanding.
    #[must_use]
    pub fn is_waiting_decision(&self) -> bool {
        self.state.borrow().waiting_decision
    }

    /// Time since [`start`](Self::start) was called.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at
            .get()
            .map_or(Duration::ZERO, |started| started.elapsed())
    }

    /// First conversation identity observed in this attempt chain.
    #[must_use]
    pub fn conversation_id(&self) -> Option<String> {
        self.conversation_id.get().cloned()
    }

    /// Open decision, if any.
    pub async fn pending(&self) -> Option<PendingRequest> {
        self.coordinator.pending().await
    }

    /// Answer the open decision `request_id`. Idempotent.
    pub async fn resolve(&self, request_id: &str, answer: Answer) -> bool {
        self.coordinator.resolve(request_id, answer).await
    }

    /// Answer whichever decision is open.
    pub async fn resolve_pending(&self, answer: Answer) -> bool {
        self.coordinator.resolve_pending(answer).await
    }

    /// Cancel the session. The CLI is killed and the session settles `Aborted`.
    pub fn abort(&self) {
        info!(session_id = %self.id, "abort requested");
        self.cancel.cancel();
    }

    /// Run `prompt` to completion.
    ///
    /// The driver reports itself running from the moment this is called, not
    /// from the first poll of the returned future.
    ///
    /// Never fails: every terminal error becomes a `Failed` outcome with a
    /// human-readable message.
    pub fn start<'a>(&'a self, prompt: &'a str) -> impl Future<Output = SessionOutcome> + 'a {
        let _ = self.started_at.set(Instant::now());
        self.state.send_modify(|state| {
            state.running = true;
            state.phase = SessionPhase::Spawning;
        });
        let span = info_span!(
            "session",
            session_id = %self.id,
            channel_id = %self.config.channel_id,
        );
        self.run(prompt).instrument(span)
    }

    async fn run(&self, prompt: &str) -> SessionOutcome {
        if !self.config.directory.is_dir() {
            let err = AppError::DirectoryNotFound(self.config.directory.display().to_string());
            warn!(%err, "refusing to start session");
            return self.settle(OutcomeStatus::Failed, err.to_string());
        }

        let mut plan = AttemptPlan::first(
            self.config.auto_grant,
            self.config.prior_conversation_id.clone(),
        );

        loop {
            if self.cancel.is_cancelled() {
                return self.settle(OutcomeStatus::Aborted, ABORTED_TEXT.to_owned());
            }

            let report = match self.run_attempt(&plan, prompt).await {
                Ok(report) => report,
                Err(err) => {
                    warn!(attempt = plan.attempt, %err, "attempt failed");
                    return self.settle(OutcomeStatus::Failed, err.to_string());
                }
            };

            match report {
                AttemptReport::Finished { status, text } => return self.settle(status, text),
                AttemptReport::Aborted => {
                    return self.settle(OutcomeStatus::Aborted, ABORTED_TEXT.to_owned());
                }
                AttemptReport::Declined { denial } => {
                    info!(attempt = plan.attempt, "denied tool was not granted");
                    return self.settle(OutcomeStatus::Failed, denial);
                }
                AttemptReport::RestartOwed { denial } => {
                    if plan.attempt >= MAX_ATTEMPTS {
                        let err = AppError::AuthorizationExhausted(denial);
                        warn!(attempt = plan.attempt, %err, "restart budget exhausted");
                        return self.settle(OutcomeStatus::Failed, err.to_string());
                    }
                    plan = plan.restart(self.conversation_id());
                    info!(
                        attempt = plan.attempt,
                        resume_id = plan.resume_id.as_deref(),
                        "permission granted; restarting with auto-grant"
                    );
                    self.publish(SessionEvent::Restarting {
                        channel_id: self.config.channel_id.clone(),
                        session_id: self.id.clone(),
                        attempt: plan.attempt,
                    })
                    .await;
                }
            }
        }
    }

    async fn run_attempt(&self, plan: &AttemptPlan, prompt: &str) -> Result<AttemptReport> {
        self.state.send_replace(SessionState::for_attempt(plan.attempt));

        let spec = SpawnSpec {
            program: self.config.host_cli.clone(),
            args: plan.command_args(&self.config.host_cli_args, prompt),
            working_dir: self.config.directory.clone(),
        };
        info!(
            attempt = plan.attempt,
            auto_grant = plan.auto_grant,
            resume_id = plan.resume_id.as_deref(),
            "spawning assistant CLI"
        );
        let process = PtyProcess::spawn(&spec)?;
        self.set_phase(SessionPhase::Streaming);

        let mut attempt = Attempt {
            process,
            throttle: StatusThrottle::new(self.config.status_interval),
            deadline: deadline_after(Instant::now(), self.config.attempt_timeout),
            denial_prompted: false,
            declined: None,
        };

        let mut lines = 0_usize;
        loop {
            let deadline = attempt.deadline;
            let read = tokio::select! {
                biased;
                () = self.cancel.cancelled() => None,
                read = tokio::time::timeout_at(deadline, attempt.process.read_line()) => Some(read),
            };
            let Some(read) = read else {
                terminate(&mut attempt.process).await;
                return Ok(AttemptReport::Aborted);
            };

            let line = match read {
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => break,
                Ok(Err(err)) => {
                    warn!(%err, "reading CLI output failed; treating as end of stream");
                    break;
                }
                Err(_elapsed) => {
                    terminate(&mut attempt.process).await;
                    return Err(AppError::ReadTimeout(self.config.attempt_timeout));
                }
            };
            lines += 1;

            let parsed = parse_line(&line);
            if let Some(id) = parsed.conversation_id {
                self.capture_conversation_id(id);
            }
            for message in parsed.messages {
                if let Flow::Abort = self.apply(&mut attempt, message).await {
                    terminate(&mut attempt.process).await;
                    return Ok(AttemptReport::Aborted);
                }
            }
        }

        info!(lines, "CLI output closed");
        self.set_phase(SessionPhase::Finishing);
        self.finish_attempt(attempt).await
    }

    async fn finish_attempt(&self, mut attempt: Attempt) -> Result<AttemptReport> {
        let exit = attempt.process.wait().await?;
        let stderr = attempt.process.stderr_output().await;
        info!(code = exit.code(), killed = attempt.process.is_killed(), "CLI exited");

        let state = self.state();
        if state.restart_owed {
            let denial = state.denials.last().cloned().unwrap_or_default();
            return Ok(AttemptReport::RestartOwed { denial });
        }
        if let Some(denial) = attempt.declined {
            return Ok(AttemptReport::Declined { denial });
        }

        if !exit.success() && !attempt.process.is_killed() && !stderr.trim().is_empty() {
            warn!(code = exit.code(), "CLI failed with error output");
            return Ok(AttemptReport::Finished {
                status: OutcomeStatus::Failed,
                text: format!("error:\n{}", stderr.trim_end()),
            });
        }

        let status = if exit.success() || !state.results.is_empty() {
            OutcomeStatus::Completed
        } else {
            OutcomeStatus::Failed
        };
        Ok(AttemptReport::Finished {
            status,
            text: state.final_text(),
        })
    }

    #[allow(clippy::too_many_lines)] // Exhaustive match over protocol messages.
    async fn apply(&self, attempt: &mut Attempt, message: StreamMessage) -> Flow {
        match message {
            StreamMessage::Assistant(text) => {
                self.state.send_modify(|state| state.current_text = text);
                self.report_status(attempt, None);
            }
            StreamMessage::DeltaText(text) => {
                self.state.send_modify(|state| state.current_text.push_str(&text));
                self.report_status(attempt, None);
            }
            StreamMessage::Unrecognized(raw) => {
                self.state.send_modify(|state| {
                    state.current_text.push_str(&raw);
                    state.current_text.push('\n');
                });
                self.report_status(attempt, None);
            }
            StreamMessage::ToolStart(name) => {
                debug!(tool = %name, "tool started");
                self.state.send_modify(|state| state.current_tool = Some(name));
                self.report_status(attempt, None);
            }
            StreamMessage::ToolStop => {
                self.state.send_modify(|state| state.current_tool = None);
            }
            StreamMessage::Result(text) => {
                info!(chars = text.chars().count(), "result received");
                self.state.send_modify(|state| state.results.push(text));
            }
            StreamMessage::SystemInit => info!("assistant CLI initialized"),
            StreamMessage::PermissionRequest {
                tool,
                description,
                path,
            } => {
                let request = PendingRequest::new(
                    DecisionKind::Authorization,
                    tool,
                    self.config.decision_timeout,
                )
                .with_detail(description)
                .with_path(path);
                let Some(resolution) = self.await_decision(attempt, request, false).await else {
                    return Flow::Abort;
                };
                self.write_reply(attempt, resolution.answer.reply()).await;
            }
            StreamMessage::InputRequest { question } => {
                let request = PendingRequest::new(
                    DecisionKind::Clarification,
                    question,
                    self.config.decision_timeout,
                );
                let Some(resolution) = self.await_decision(attempt, request, false).await else {
                    return Flow::Abort;
                };
                self.write_reply(attempt, resolution.answer.reply()).await;
                self.report_status(attempt, Some("answer sent"));
            }
            StreamMessage::ToolResultError(text) => {
                debug!(error = %preview(&text, 200), "tool call failed");
            }
            StreamMessage::AuthorizationDenied(text) => {
                warn!(denial = %preview(&text, 200), "tool call denied");
                self.state.send_modify(|state| state.denials.push(text.clone()));
                if attempt.denial_prompted {
                    return Flow::Continue;
                }
                attempt.denial_prompted = true;
                attempt.process.kill();

                let request = PendingRequest::new(
                    DecisionKind::Authorization,
                    text.clone(),
                    self.config.decision_timeout,
                )
                .with_detail(DENIAL_DETAIL);
                let Some(resolution) = self.await_decision(attempt, request, true).await else {
                    return Flow::Abort;
                };
                if resolution.answer.is_grant() {
                    info!("denied tool granted; restart owed");
                    self.state.send_modify(|state| state.restart_owed = true);
                } else {
                    attempt.declined = Some(text);
                }
            }
            StreamMessage::Unhandled(kind) => debug!(kind = %kind, "ignoring stream record"),
        }
        Flow::Continue
    }

    /// Suspend on a decision. Returns `None` if the session was aborted meanwhile.
    async fn await_decision(
        &self,
        attempt: &mut Attempt,
        request: PendingRequest,
        permission: bool,
    ) -> Option<Resolution> {
        let suspended_at = Instant::now();
        self.state.send_modify(|state| {
            state.waiting_decision = true;
            state.waiting_permission = permission;
            state.phase = SessionPhase::AwaitingDecision;
        });

        let kind = request.kind;
        let resolution = match self.coordinator.open(request).await {
            Ok(handle) => {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => {
                        self.coordinator.cancel().await;
                        None
                    }
                    resolution = self.coordinator.wait(handle) => Some(resolution),
                }
            }
            Err(err) => {
                warn!(%err, "cannot open decision request; applying default answer");
                Some(Resolution {
                    request_id: String::new(),
                    kind,
                    answer: Answer::default_for(kind),
                    timed_out: false,
                })
            }
        };

        // Time spent waiting on the operator does not count against the attempt.
        attempt.deadline = deadline_after(attempt.deadline, suspended_at.elapsed());
        self.state.send_modify(|state| {
            state.waiting_decision = false;
            state.waiting_permission = false;
            state.phase = SessionPhase::Streaming;
        });

        if let Some(resolution) = &resolution {
            info!(
                request_id = %resolution.request_id,
                reply = resolution.answer.reply(),
                timed_out = resolution.timed_out,
                "decision settled"
            );
            self.publish(SessionEvent::DecisionSettled {
                channel_id: self.config.channel_id.clone(),
                session_id: self.id.clone(),
                request_id: resolution.request_id.clone(),
                kind: resolution.kind,
                reply: resolution.answer.reply().to_owned(),
                timed_out: resolution.timed_out,
            })
            .await;
        }
        resolution
    }

    async fn write_reply(&self, attempt: &mut Attempt, reply: &str) {
        if let Err(err) = attempt.process.write_line(reply).await {
            warn!(%err, "failed to deliver reply to CLI");
        }
    }

    fn capture_conversation_id(&self, id: String) {
        if self.conversation_id.get().is_some() {
            return;
        }
        info!(conversation_id = %id, "conversation identity observed");
        let _ = self.conversation_id.set(id);
    }

    fn report_status(&self, attempt: &mut Attempt, phrase: Option<&str>) {
        if !attempt.throttle.ready(Instant::now()) {
            return;
        }
        let update = {
            let state = self.state.borrow();
            StatusUpdate {
                channel_id: self.config.channel_id.clone(),
                session_id: self.id.clone(),
                phrase: phrase.map_or_else(|| status_phrase(&state), str::to_owned),
                elapsed_secs: self.elapsed().as_secs(),
                preview: preview(&state.current_text, self.config.preview_chars),
            }
        };
        if let Err(err) = self.events.try_send(SessionEvent::Status(update)) {
            debug!(%err, "status update dropped");
        }
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.state.send_modify(|state| state.phase = phase);
    }

    fn settle(&self, status: OutcomeStatus, text: String) -> SessionOutcome {
        let phase = match status {
            OutcomeStatus::Completed => SessionPhase::Completed,
            OutcomeStatus::Failed => SessionPhase::Failed,
            OutcomeStatus::Aborted => SessionPhase::Aborted,
        };
        self.state.send_modify(|state| {
            state.running = false;
            state.waiting_decision = false;
            state.waiting_permission = false;
            state.phase = phase;
        });

        let outcome = SessionOutcome {
            status,
            text,
            elapsed: self.elapsed(),
            conversation_id: self.conversation_id(),
        };
        info!(
            status = ?outcome.status,
            elapsed_secs = outcome.elapsed_secs(),
            chars = outcome.text.chars().count(),
            "session settled"
        );
        outcome
    }

    async fn publish(&self, event: SessionEvent) {
        if self.events.send(event).await.is_err() {
            debug!("event receiver gone");
        }
    }
}

async fn terminate(process: &mut PtyProcess) {
    process.kill();
    if let Err(err) = process.wait().await {
        debug!(%err, "reaping killed CLI failed");
    }
}

fn status_phrase(state: &SessionState) -> String {
    if state.waiting_decision {
        return "waiting for input".to_owned();
    }
    match &state.current_tool {
        Some(tool) => format!("running {tool}"),
        None => "generating response".to_owned(),
    }
}

/// Last `max_chars` characters of `text`, marked when truncated.
#[must_use]
pub fn preview(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_owned();
    }
    let tail: String = text.chars().skip(total - max_chars).collect();
    format!("...\n{tail}")
}
