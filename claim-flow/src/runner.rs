//! FlowRunner – loads a session, applies exactly **one** event, and reports what the
//! event produced.
//!
//! Submission is the only slow step of a turn. The runner releases the session
//! while the prediction request is in flight, so the same conversation can keep
//! answering chatter; the controller's `Submitting` state rejects any second
//! form in the meantime. The request and the dispatch of its result run on their
//! own task, so a caller that gives up on the turn cannot leave the session
//! stuck in `Submitting`.
//!
//! ```rust,ignore
//! let runner = FlowRunner::new(storage, submission);
//! let session = runner.create_session(None).await?;
//! let turn = runner
//!     .run(&session.id, ConversationEvent::UserTextSubmitted("I had an accident".into()))
//!     .await?;
//! assert_eq!(turn.messages.last().unwrap().content, "Please provide details of the claim.");
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::{Instrument, info, instrument};
use uuid::Uuid;

use crate::{
    controller::{ConversationEvent, ConversationState},
    error::{FlowError, Result},
    sink::{ChatMessage, OpenForm},
    storage::{Session, SessionStorage},
    submission::SubmissionService,
};

/// What a single event changed in a session
#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    pub session_id: String,
    /// Messages appended while the event was handled
    pub messages: Vec<ChatMessage>,
    pub state: ConversationState,
    pub open_form: Option<OpenForm>,
}

/// High-level helper that orchestrates the common _load → dispatch → report_ pattern.
#[derive(Clone)]
pub struct FlowRunner {
    storage: Arc<dyn SessionStorage>,
    submission: Arc<SubmissionService>,
}

impl FlowRunner {
    pub fn new(storage: Arc<dyn SessionStorage>, submission: Arc<SubmissionService>) -> Self {
        Self {
            storage,
            submission,
        }
    }

    pub fn storage(&self) -> Arc<dyn SessionStorage> {
        self.storage.clone()
    }

    /// Creates and stores a fresh conversation. A new id is generated when none is given.
    pub async fn create_session(&self, id: Option<String>) -> Result<Arc<Session>> {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let session = Arc::new(Session::new(id, self.submission.clone()));
        self.storage.save(session.clone()).await?;
        info!(session_id = %session.id, "Created conversation session");
        Ok(session)
    }

    /// Apply **exactly one** event to the given session.
    #[instrument(skip(self, event), fields(event = event.name()))]
    pub async fn run(&self, session_id: &str, event: ConversationEvent) -> Result<TurnResult> {
        // 1. Load session
        let session = self
            .storage
            .get(session_id)
            .await?
            .ok_or_else(|| FlowError::SessionNotFound(session_id.to_string()))?;

        let offset = session.log().len();

        // 2. Dispatch; the lock is dropped before any submission is awaited
        let pending = {
            let mut controller = session.controller().lock().await;
            controller
                .dispatch(event)?
                .map(|pending| (pending, controller.submission()))
        };

        // 3. Submit and feed the answer back, detached from this caller
        if let Some((pending, submission)) = pending {
            let claim_id = pending.claim_id;
            let task_session = session.clone();
            let task = tokio::spawn(
                async move {
                    let result = submission.submit(&pending.record).await;
                    task_session
                        .controller()
                        .lock()
                        .await
                        .dispatch(ConversationEvent::SubmissionResult(result))
                        .map(|_| ())
                }
                .in_current_span(),
            );
            task.await.map_err(|e| FlowError::SubmissionAborted {
                claim_id,
                reason: e.to_string(),
            })??;
        }

        let state = session.controller().lock().await.state();
        Ok(TurnResult {
            session_id: session.id.clone(),
            messages: session.log().messages_since(offset),
            state,
            open_form: session.open_form(),
        })
    }
}
