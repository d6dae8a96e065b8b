pub mod controller;
pub mod error;
pub mod intent;
pub mod runner;
pub mod schema;
pub mod sink;
pub mod storage;
pub mod submission;

// Re-export commonly used types
pub use controller::{
    ConversationController, ConversationEvent, ConversationState, PendingSubmission, messages,
};
pub use error::{FlowError, RecordError, Result, SubmissionError, ValidationError};
pub use intent::{CLAIM_VOCABULARY, Intent, IntentClassifier};
pub use runner::{FlowRunner, TurnResult};
pub use schema::{
    ClaimField, ClaimId, ClaimIdCounter, ClaimRecord, ClaimSchema, FieldSpec, REQUIRED_FIELDS,
};
pub use sink::{ChatMessage, ConversationLog, FormSink, FormSlot, MessageSink, OpenForm, Role};
pub use storage::{InMemorySessionStorage, Session, SessionSnapshot, SessionStorage};
#[cfg(feature = "http")]
pub use submission::HttpPredictionChannel;
pub use submission::{
    DEFAULT_DOC_S3_PATH, Prediction, PredictionChannel, PredictionOutcome, PredictionRequest,
    SubmissionService, decode_response,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::tests::StubChannel;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_storage() {
        let session_storage = InMemorySessionStorage::new();
        let submission = Arc::new(SubmissionService::with_default_document(Arc::new(
            StubChannel::predicting("Approve"),
        )));

        let session = Arc::new(Session::new("session1", submission));
        session_storage.save(session.clone()).await.unwrap();
        assert_eq!(session_storage.len(), 1);

        let retrieved_session = session_storage.get("session1").await.unwrap();
        assert!(retrieved_session.is_some());

        session_storage.delete("session1").await.unwrap();
        assert!(session_storage.get("session1").await.unwrap().is_none());
        assert!(session_storage.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_reflects_conversation() {
        let submission = Arc::new(SubmissionService::with_default_document(Arc::new(
            StubChannel::predicting("Approve"),
        )));
        let session = Session::new("s", submission);
        session
            .controller()
            .lock()
            .await
            .handle(ConversationEvent::UserTextSubmitted("I had an accident".into()))
            .await
            .unwrap();

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.last_claim_id, Some(ClaimId(1)));
        assert_eq!(snapshot.open_form.as_ref().unwrap().claim_id, ClaimId(1));

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["state"]["state"], "awaiting_claim_form");
        assert_eq!(value["state"]["claim_id"], 1);
    }
}
