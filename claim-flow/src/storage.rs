use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::{
    controller::{ConversationController, ConversationState},
    error::Result,
    schema::ClaimId,
    sink::{ChatMessage, ConversationLog, FormSlot, OpenForm},
    submission::{PredictionOutcome, SubmissionService},
};

/// One user's conversation: its controller plus what it has rendered so far
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    controller: Mutex<ConversationController>,
    log: Arc<ConversationLog>,
    form: Arc<FormSlot>,
}

impl Session {
    pub fn new(id: impl Into<String>, submission: Arc<SubmissionService>) -> Self {
        let log = Arc::new(ConversationLog::new());
        let form = Arc::new(FormSlot::new());
        let controller = ConversationController::new(submission, log.clone(), form.clone());
        Self {
            id: id.into(),
            created_at: Utc::now(),
            controller: Mutex::new(controller),
            log,
            form,
        }
    }

    /// Exclusive access to the conversation; hold it for one event at a time.
    pub fn controller(&self) -> &Mutex<ConversationController> {
        &self.controller
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn open_form(&self) -> Option<OpenForm> {
        self.form.current()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let controller = self.controller.lock().await;
        SessionSnapshot {
            id: self.id.clone(),
            created_at: self.created_at,
            state: controller.state(),
            last_claim_id: controller.last_claim_id(),
            last_outcome: controller.last_outcome().cloned(),
            messages: self.log.messages(),
            open_form: self.form.current(),
        }
    }
}

/// Serializable view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub state: ConversationState,
    pub last_claim_id: Option<ClaimId>,
    pub last_outcome: Option<PredictionOutcome>,
    pub messages: Vec<ChatMessage>,
    pub open_form: Option<OpenForm>,
}

/// Trait for storing and retrieving sessions
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn save(&self, session: Arc<Session>) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Arc<Session>>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// In-memory implementation of SessionStorage
#[derive(Default)]
pub struct InMemorySessionStorage {
    sessions: Arc<DashMap<String, Arc<Session>>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn save(&self, session: Arc<Session>) -> Result<()> {
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Arc<Session>>> {
        Ok(self.sessions.get(id).map(|entry| entry.clone()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions.remove(id);
        Ok(())
    }
}
