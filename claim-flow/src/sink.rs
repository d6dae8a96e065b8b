//! Output side of a conversation: the chat log and the claim form.
//!
//! The controller only talks to the [`MessageSink`] and [`FormSink`] traits.
//! [`ConversationLog`] and [`FormSlot`] are in-memory implementations that a
//! front-end can read back after each event.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::{ClaimField, ClaimId, ClaimSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    System,
}

/// One line of the visible conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Receives every message the conversation produces
pub trait MessageSink: Send + Sync {
    fn append(&self, role: Role, text: &str);
}

/// Renders the claim form. Whatever the user does with it comes back to the
/// controller as a `FormSubmitted` or `FormCancelled` event.
pub trait FormSink: Send + Sync {
    fn present_form(&self, schema: &ClaimSchema, claim_id: ClaimId);

    fn show_validation_errors(&self, claim_id: ClaimId, missing: &[ClaimField]);

    fn close_form(&self, claim_id: ClaimId);
}

/// Append-only transcript
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    messages: Arc<Mutex<Vec<ChatMessage>>>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Messages appended after the first `offset` ones
    pub fn messages_since(&self, offset: usize) -> Vec<ChatMessage> {
        self.lock().iter().skip(offset).cloned().collect()
    }

    pub fn last_n(&self, n: usize) -> Vec<ChatMessage> {
        let messages = self.lock();
        let start = messages.len().saturating_sub(n);
        messages[start..].to_vec()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ChatMessage>> {
        // A poisoned log still holds valid messages
        self.messages.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MessageSink for ConversationLog {
    fn append(&self, role: Role, text: &str) {
        self.lock().push(ChatMessage::new(role, text));
    }
}

/// A form currently shown to the user
#[derive(Debug, Clone, Serialize)]
pub struct OpenForm {
    pub claim_id: ClaimId,
    pub schema: ClaimSchema,
    pub missing: Vec<ClaimField>,
}

/// Holds at most one open form
#[derive(Debug, Clone, Default)]
pub struct FormSlot {
    form: Arc<Mutex<Option<OpenForm>>>,
}

impl FormSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<OpenForm> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<OpenForm>> {
        self.form.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl FormSink for FormSlot {
    fn present_form(&self, schema: &ClaimSchema, claim_id: ClaimId) {
        *self.lock() = Some(OpenForm {
            claim_id,
            schema: schema.clone(),
            missing: Vec::new(),
        });
    }

    fn show_validation_errors(&self, claim_id: ClaimId, missing: &[ClaimField]) {
        if let Some(form) = self.lock().as_mut().filter(|f| f.claim_id == claim_id) {
            form.missing = missing.to_vec();
        }
    }

    fn close_form(&self, claim_id: ClaimId) {
        let mut form = self.lock();
        if form.as_ref().is_some_and(|f| f.claim_id == claim_id) {
            *form = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_keeps_order_and_offsets() {
        let log = ConversationLog::new();
        log.append(Role::User, "hello");
        log.append(Role::System, "I'm sorry, I didn't understand that.");
        log.append(Role::User, "claim");

        assert_eq!(log.len(), 3);
        let tail = log.messages_since(1);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].role, Role::System);
        assert_eq!(log.last_n(1)[0].content, "claim");
        assert_eq!(log.last_n(10).len(), 3);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let message = ChatMessage::system("hi");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["role"], "system");
    }

    #[test]
    fn test_form_slot_tracks_one_form() {
        let slot = FormSlot::new();
        let schema = ClaimSchema::new();
        slot.present_form(&schema, ClaimId(1));
        slot.show_validation_errors(ClaimId(1), &[ClaimField::PolicyNumber]);

        let form = slot.current().unwrap();
        assert_eq!(form.claim_id, ClaimId(1));
        assert_eq!(form.missing, vec![ClaimField::PolicyNumber]);

        // closing some other claim leaves the open one alone
        slot.close_form(ClaimId(2));
        assert!(slot.current().is_some());

        slot.close_form(ClaimId(1));
        assert!(slot.current().is_none());
    }
}
