use thiserror::Error;

use crate::schema::{ClaimField, ClaimId};

/// Errors returned to callers that drive a conversation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error("Event {event} is not valid in state {state}")]
    UnexpectedEvent { state: String, event: String },

    #[error("Form for claim {received} does not match the open claim {expected}")]
    StaleForm { expected: ClaimId, received: ClaimId },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("Submission for claim {claim_id} did not complete: {reason}")]
    SubmissionAborted { claim_id: ClaimId, reason: String },
}

/// Raised while building a claim record from raw name/value pairs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Unexpected field: {0}")]
    UnknownField(String),

    #[error("Field given more than once: {0}")]
    DuplicateField(String),
}

/// Required claim fields left empty
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Missing required fields: {}", display_fields(.missing))]
pub struct ValidationError {
    pub missing: Vec<ClaimField>,
}

fn display_fields(fields: &[ClaimField]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure talking to the prediction service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Failed to encode claim request: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, FlowError>;
