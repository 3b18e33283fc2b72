//! Awaitable decision requests.
//!
//! The session read loop opens a request and awaits it; whoever talks to the
//! operator answers it through [`RequestCoordinator::resolve`]. At most one
//! request is open at a time. The deadline is enforced here: an unanswered
//! request settles with the default answer for its kind.

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::models::decision::{Answer, DecisionKind, PendingRequest};
use crate::{AppError, Result};

use super::{deadline_after, SessionEvent};

/// Receiving side of an open request, consumed by [`RequestCoordinator::wait`].
#[derive(Debug)]
pub struct RequestHandle {
    request: PendingRequest,
    rx: oneshot::Receiver<Answer>,
    deadline: Instant,
}

impl RequestHandle {
    /// The request this handle waits on.
    #[must_use]
    pub fn request(&self) -> &PendingRequest {
        &self.request
    }
}

/// How a request settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Request that settled.
    pub request_id: String,
    /// Kind of the request.
    pub kind: DecisionKind,
    /// Answer to apply.
    pub answer: Answer,
    /// The deadline elapsed before anyone answered.
    pub timed_out: bool,
}

#[derive(Debug)]
struct Slot {
    request: PendingRequest,
    tx: Option<oneshot::Sender<Answer>>,
}

/// Single-slot request/answer correlation for one session.
#[derive(Debug)]
pub struct RequestCoordinator {
    channel_id: String,
    session_id: String,
    slot: Mutex<Option<Slot>>,
    events: mpsc::Sender<SessionEvent>,
}

impl RequestCoordinator {
    /// Create a coordinator publishing to `events`.
    #[must_use]
    pub fn new(channel_id: String, session_id: String, events: mpsc::Sender<SessionEvent>) -> Self {
        Self {
            channel_id,
            session_id,
            slot: Mutex::new(None),
            events,
        }
    }

    /// Open `request` and publish it as [`SessionEvent::DecisionRequested`].
    ///
    /// The deadline starts now and lasts `request.timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::RequestAlreadyPending`] if another request is open.
    pub async fn open(&self, request: PendingRequest) -> Result<RequestHandle> {
        let (tx, rx) = oneshot::channel();
        {
            let mut slot = self.slot.lock().await;
            if let Some(existing) = slot.as_ref() {
                return Err(AppError::RequestAlreadyPending(existing.request.id.clone()));
            }
            *slot = Some(Slot {
                request: request.clone(),
                tx: Some(tx),
            });
        }

        info!(
            request_id = %request.id,
            kind = ?request.kind,
            timeout_secs = request.timeout.as_secs(),
            "decision requested"
        );

        let deadline = deadline_after(Instant::now(), request.timeout);
        let event = SessionEvent::DecisionRequested {
            channel_id: self.channel_id.clone(),
            session_id: self.session_id.clone(),
            request: request.clone(),
        };
        if self.events.send(event).await.is_err() {
            debug!("event receiver gone; decision request not published");
        }

        Ok(RequestHandle {
            request,
            rx,
            deadline,
        })
    }

    /// Suspend until the request is answered or its deadline passes.
    ///
    /// Timeouts and abandoned requests settle with [`Answer::default_for`].
    /// The slot is cleared either way.
    pub async fn wait(&self, handle: RequestHandle) -> Resolution {
        let RequestHandle {
            request,
            rx,
            deadline,
        } = handle;

        let (answer, timed_out) = match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(answer)) => (answer, false),
            Ok(Err(_closed)) => {
                debug!(request_id = %request.id, "decision request abandoned");
                (Answer::default_for(request.kind), false)
            }
            Err(_elapsed) => {
                warn!(request_id = %request.id, kind = ?request.kind, "decision request timed out");
                (Answer::default_for(request.kind), true)
            }
        };

        let mut slot = self.slot.lock().await;
        if slot.as_ref().is_some_and(|open| open.request.id == request.id) {
            *slot = None;
        }

        Resolution {
            request_id: request.id,
            kind: request.kind,
            answer,
            timed_out,
        }
    }

    /// Answer the open request with id `request_id`.
    ///
    /// Returns `false` (and does nothing) if no such request is open or it
    /// was already answered.
    pub async fn resolve(&self, request_id: &str, answer: Answer) -> bool {
        let mut slot = self.slot.lock().await;
        let Some(open) = slot.as_mut().filter(|open| open.request.id == request_id) else {
            debug!(request_id, "resolve ignored: no matching request");
            return false;
        };
        let Some(tx) = open.tx.take() else {
            debug!(request_id, "resolve ignored: already answered");
            return false;
        };
        tx.send(answer).is_ok()
    }

    /// Answer whatever request is open.
    ///
    /// Returns `false` if none is open or it was already answered.
    pub async fn resolve_pending(&self, answer: Answer) -> bool {
        let request_id = {
            let slot = self.slot.lock().await;
            match slot.as_ref() {
                Some(open) if open.tx.is_some() => open.request.id.clone(),
                _ => return false,
            }
        };
        self.resolve(&request_id, answer).await
    }

    /// Snapshot of the open request, if it has not been answered yet.
    pub async fn pending(&self) -> Option<PendingRequest> {
        self.slot
            .lock()
            .await
            .as_ref()
            .filter(|open| open.tx.is_some())
            .map(|open| open.request.clone())
    }

    /// Drop the open request without answering it.
    pub async fn cancel(&self) {
        if let Some(open) = self.slot.lock().await.take() {
            debug!(request_id = %open.request.id, "decision request cancelled");
        }
    }
}
