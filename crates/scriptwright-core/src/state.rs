//! UI-agnostic application state types
//!
//! This module contains the data structures shared between the session core
//! and any front-end (TUI, desktop app, tests). Nothing here depends on a UI
//! framework or on a particular AI provider.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// One turn of the conversation as sent to an AI backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// Who authored an entry in the message log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Create,
    Edit,
}

impl SuggestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionKind::Create => "create",
            SuggestionKind::Edit => "edit",
        }
    }
}

/// What the user decided about a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    #[default]
    Pending,
    Approved,
    Declined,
}

impl From<Decision> for SuggestionStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => SuggestionStatus::Approved,
            Decision::Declined => SuggestionStatus::Declined,
        }
    }
}

/// An AI-proposed file creation or edit awaiting approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub target_name: String,
    pub code: String,
    pub explanation: String,
    /// Human-readable change summaries, only ever present for edits
    pub changes: Option<Vec<String>>,
    status: SuggestionStatus,
}

impl Suggestion {
    pub fn pending(
        kind: SuggestionKind,
        target_name: impl Into<String>,
        code: impl Into<String>,
        explanation: impl Into<String>,
        changes: Option<Vec<String>>,
    ) -> Self {
        Self {
            kind,
            target_name: target_name.into(),
            code: code.into(),
            explanation: explanation.into(),
            changes: match kind {
                SuggestionKind::Edit => changes,
                SuggestionKind::Create => None,
            },
            status: SuggestionStatus::Pending,
        }
    }

    pub fn status(&self) -> SuggestionStatus {
        self.status
    }

    pub fn is_pending(&self) -> bool {
        self.status == SuggestionStatus::Pending
    }

    /// Record the user's decision. Only the first decision sticks; returns
    /// false if the suggestion had already been resolved.
    pub(crate) fn resolve(&mut self, decision: Decision) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = decision.into();
        true
    }
}

/// An entry in the ordered message log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: Sender,
    pub text: String,
    pub suggestion: Option<Suggestion>,
}

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Millisecond timestamp plus a process-wide sequence number, so two
/// messages created within the same tick still get distinct ids.
fn next_message_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let seq = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{millis}-{seq}")
}

/// Append-only log of messages. Entries can be updated in place but are
/// never removed or reordered.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new message and return its id
    pub fn push(&mut self, sender: Sender, text: impl Into<String>) -> String {
        self.push_message(sender, text.into(), None)
    }

    pub fn push_suggestion(&mut self, suggestion: Suggestion) -> String {
        self.push_message(Sender::Assistant, String::new(), Some(suggestion))
    }

    fn push_message(&mut self, sender: Sender, text: String, suggestion: Option<Suggestion>) -> String {
        let id = next_message_id();
        self.messages.push(Message {
            id: id.clone(),
            sender,
            text,
            suggestion,
        });
        id
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// Overwrite the text of an existing message; unknown ids are ignored
    pub(crate) fn set_text(&mut self, id: &str, text: impl Into<String>) {
        if let Some(message) = self.get_mut(id) {
            message.text = text.into();
        }
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Most recent message whose suggestion is still awaiting a decision
    pub fn latest_pending(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.suggestion.as_ref().is_some_and(Suggestion::is_pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_unique_under_rapid_creation() {
        let mut log = MessageLog::new();
        let ids: HashSet<String> = (0..500)
            .map(|i| log.push(Sender::User, format!("m{i}")))
            .collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn test_log_preserves_order() {
        let mut log = MessageLog::new();
        log.push(Sender::User, "first");
        log.push(Sender::Assistant, "second");
        let texts: Vec<&str> = log.as_slice().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_suggestion_resolves_once() {
        let mut suggestion =
            Suggestion::pending(SuggestionKind::Edit, "Player.cs", "// new", "Added jump", None);
        assert!(suggestion.resolve(Decision::Declined));
        assert!(!suggestion.resolve(Decision::Approved));
        assert_eq!(suggestion.status(), SuggestionStatus::Declined);
    }

    #[test]
    fn test_create_suggestion_drops_changes() {
        let suggestion = Suggestion::pending(
            SuggestionKind::Create,
            "Enemy.cs",
            "class Enemy {}",
            "New enemy",
            Some(vec!["ignored".to_string()]),
        );
        assert!(suggestion.changes.is_none());
    }

    #[test]
    fn test_latest_pending_skips_resolved() {
        let mut log = MessageLog::new();
        let first = log.push_suggestion(Suggestion::pending(
            SuggestionKind::Create,
            "A.cs",
            "a",
            "a",
            None,
        ));
        let second = log.push_suggestion(Suggestion::pending(
            SuggestionKind::Create,
            "B.cs",
            "b",
            "b",
            None,
        ));
        if let Some(s) = log.get_mut(&second).and_then(|m| m.suggestion.as_mut()) {
            s.resolve(Decision::Approved);
        }
        assert_eq!(log.latest_pending().map(|m| m.id.clone()), Some(first));
    }
}
