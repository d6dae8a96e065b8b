use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    error::{FlowError, Result, SubmissionError},
    intent::{Intent, IntentClassifier},
    schema::{ClaimId, ClaimIdCounter, ClaimRecord, ClaimSchema},
    sink::{FormSink, MessageSink, Role},
    submission::{PredictionOutcome, SubmissionService},
};

/// Texts the controller shows to the user
pub mod messages {
    pub const NOT_UNDERSTOOD: &str = "I'm sorry, I didn't understand that.";
    pub const PROVIDE_DETAILS: &str = "Please provide details of the claim.";
    pub const FILL_REQUIRED: &str = "Please fill in all required fields.";
    pub const SUBMITTED: &str =
        "Your claim details have been submitted successfully. Please wait while we generate a response.";
    pub const PREDICTION_UNAVAILABLE: &str = "Prediction data not available.";
    pub const SUBMISSION_FAILED: &str =
        "There was an error submitting your claim details. Please try again later.";
    pub const FORM_ALREADY_OPEN: &str = "Please complete or cancel the open claim form first.";
    pub const STILL_PROCESSING: &str =
        "Your claim is still being processed. Please wait for the response.";

    pub fn prediction(verdict: &str) -> String {
        format!("Prediction about your claim: {verdict}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    AwaitingClaimForm { claim_id: ClaimId },
    Validating { claim_id: ClaimId },
    Submitting { claim_id: ClaimId },
    Done,
}

impl ConversationState {
    pub fn claim_id(&self) -> Option<ClaimId> {
        match self {
            ConversationState::AwaitingClaimForm { claim_id }
            | ConversationState::Validating { claim_id }
            | ConversationState::Submitting { claim_id } => Some(*claim_id),
            ConversationState::Idle | ConversationState::Done => None,
        }
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationState::Idle => write!(f, "Idle"),
            ConversationState::AwaitingClaimForm { claim_id } => {
                write!(f, "AwaitingClaimForm({claim_id})")
            }
            ConversationState::Validating { claim_id } => write!(f, "Validating({claim_id})"),
            ConversationState::Submitting { claim_id } => write!(f, "Submitting({claim_id})"),
            ConversationState::Done => write!(f, "Done"),
        }
    }
}

/// Everything that can move a conversation forward
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    UserTextSubmitted(String),
    FormSubmitted {
        claim_id: ClaimId,
        record: ClaimRecord,
    },
    FormCancelled {
        claim_id: ClaimId,
    },
    SubmissionResult(std::result::Result<PredictionOutcome, SubmissionError>),
}

impl ConversationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ConversationEvent::UserTextSubmitted(_) => "UserTextSubmitted",
            ConversationEvent::FormSubmitted { .. } => "FormSubmitted",
            ConversationEvent::FormCancelled { .. } => "FormCancelled",
            ConversationEvent::SubmissionResult(_) => "SubmissionResult",
        }
    }
}

/// A validated claim waiting to be sent.
///
/// Returned by [`ConversationController::dispatch`]; the caller submits it and
/// feeds the answer back as [`ConversationEvent::SubmissionResult`].
#[derive(Debug, Clone)]
pub struct PendingSubmission {
    pub claim_id: ClaimId,
    pub record: ClaimRecord,
}

/// Drives one conversation: text in, claim form out, claim submitted, verdict shown.
///
/// The controller is the only owner of its claim id counter and state. Only
/// one claim flow is active at a time; a claim request made while a form is
/// open is answered with a reminder and otherwise ignored.
pub struct ConversationController {
    classifier: IntentClassifier,
    schema: ClaimSchema,
    submission: Arc<SubmissionService>,
    messages: Arc<dyn MessageSink>,
    forms: Arc<dyn FormSink>,
    claim_ids: ClaimIdCounter,
    state: ConversationState,
    last_outcome: Option<PredictionOutcome>,
}

impl ConversationController {
    pub fn new(
        submission: Arc<SubmissionService>,
        messages: Arc<dyn MessageSink>,
        forms: Arc<dyn FormSink>,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(),
            schema: ClaimSchema::new(),
            submission,
            messages,
            forms,
            claim_ids: ClaimIdCounter::new(),
            state: ConversationState::Idle,
            last_outcome: None,
        }
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn schema(&self) -> &ClaimSchema {
        &self.schema
    }

    pub fn submission(&self) -> Arc<SubmissionService> {
        self.submission.clone()
    }

    pub fn last_outcome(&self) -> Option<&PredictionOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn last_claim_id(&self) -> Option<ClaimId> {
        self.claim_ids.last_issued()
    }

    /// Applies one event and, when a claim passes validation, awaits its
    /// submission before returning.
    pub async fn handle(&mut self, event: ConversationEvent) -> Result<ConversationState> {
        if let Some(pending) = self.dispatch(event)? {
            let result = self.submission.submit(&pending.record).await;
            self.dispatch(ConversationEvent::SubmissionResult(result))?;
        }
        Ok(self.state)
    }

    /// Applies one event without performing any I/O.
    ///
    /// Returns the claim to submit when the event moved the conversation into
    /// `Submitting`. Events that do not fit the current state are rejected
    /// without side effects.
    pub fn dispatch(&mut self, event: ConversationEvent) -> Result<Option<PendingSubmission>> {
        debug!(state = %self.state, event = event.name(), "Dispatching conversation event");

        match (self.state, event) {
            (_, ConversationEvent::UserTextSubmitted(text)) => {
                self.on_user_text(&text);
                Ok(None)
            }
            (
                ConversationState::AwaitingClaimForm { claim_id },
                ConversationEvent::FormSubmitted {
                    claim_id: received,
                    record,
                },
            ) => {
                check_claim_id(claim_id, received)?;
                Ok(self.on_form_submitted(claim_id, record))
            }
            (
                ConversationState::AwaitingClaimForm { claim_id },
                ConversationEvent::FormCancelled { claim_id: received },
            ) => {
                check_claim_id(claim_id, received)?;
                self.forms.close_form(claim_id);
                info!(claim_id = %claim_id, "Claim form cancelled");
                self.transition(ConversationState::Idle);
                Ok(None)
            }
            (
                ConversationState::Submitting { claim_id },
                ConversationEvent::SubmissionResult(result),
            ) => {
                self.on_submission_result(claim_id, result);
                Ok(None)
            }
            (state, event) => {
                warn!(state = %state, event = event.name(), "Rejecting event");
                Err(FlowError::UnexpectedEvent {
                    state: state.to_string(),
                    event: event.name().to_string(),
                })
            }
        }
    }

    fn on_user_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.messages.append(Role::User, text);

        let intent = self.classifier.classify(text);
        info!(
            state = %self.state,
            intent = ?intent,
            matched = self.classifier.matched_term(text).unwrap_or(""),
            "Classified user message"
        );

        match (intent, self.state) {
            (Intent::Unknown, _) => self.say(messages::NOT_UNDERSTOOD),
            (Intent::ClaimIntent, ConversationState::Idle | ConversationState::Done) => {
                self.say(messages::PROVIDE_DETAILS);
                let claim_id = self.claim_ids.next_id();
                self.transition(ConversationState::AwaitingClaimForm { claim_id });
                self.forms.present_form(&self.schema, claim_id);
                info!(claim_id = %claim_id, "Claim form presented");
            }
            (Intent::ClaimIntent, ConversationState::AwaitingClaimForm { .. }) => {
                self.say(messages::FORM_ALREADY_OPEN)
            }
            (
                Intent::ClaimIntent,
                ConversationState::Validating { .. } | ConversationState::Submitting { .. },
            ) => self.say(messages::STILL_PROCESSING),
        }
    }

    fn on_form_submitted(
        &mut self,
        claim_id: ClaimId,
        mut record: ClaimRecord,
    ) -> Option<PendingSubmission> {
        self.transition(ConversationState::Validating { claim_id });
        record.assign_claim_id(claim_id);

        if let Err(err) = self.schema.validate(&record) {
            info!(claim_id = %claim_id, error = %err, "Claim form failed validation");
            self.say(messages::FILL_REQUIRED);
            self.forms.show_validation_errors(claim_id, &err.missing);
            self.transition(ConversationState::AwaitingClaimForm { claim_id });
            return None;
        }

        self.forms.close_form(claim_id);
        self.transition(ConversationState::Submitting { claim_id });
        self.say(messages::SUBMITTED);
        Some(PendingSubmission { claim_id, record })
    }

    fn on_submission_result(
        &mut self,
        claim_id: ClaimId,
        result: std::result::Result<PredictionOutcome, SubmissionError>,
    ) {
        match &result {
            Ok(PredictionOutcome::Predicted(prediction)) => {
                self.say(&messages::prediction(&prediction.verdict))
            }
            Ok(PredictionOutcome::Unavailable) => self.say(messages::PREDICTION_UNAVAILABLE),
            Err(err) => {
                warn!(claim_id = %claim_id, error = %err, "Claim submission failed");
                self.say(messages::SUBMISSION_FAILED);
            }
        }
        self.last_outcome = result.ok();
        self.transition(ConversationState::Done);
        self.transition(ConversationState::Idle);
    }

    fn say(&self, text: &str) {
        self.messages.append(Role::System, text);
    }

    fn transition(&mut self, next: ConversationState) {
        debug!(from = %self.state, to = %next, "Conversation state change");
        self.state = next;
    }
}

fn check_claim_id(expected: ClaimId, received: ClaimId) -> Result<()> {
    if expected == received {
        Ok(())
    } else {
        Err(FlowError::StaleForm { expected, received })
    }
}
