//! Structured file-suggestion requests and the parsing of their replies.

use crate::project::ProjectSnapshot;
use crate::session::{SendOutcome, Session};
use crate::state::{Sender, Suggestion, SuggestionKind};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

pub const APOLOGY: &str = "Sorry, I couldn't generate a valid response. Please try again.";

/// System context embedding every script of the snapshot, in snapshot order
pub fn system_instruction(snapshot: &ProjectSnapshot) -> String {
    let script_context = snapshot
        .scripts()
        .iter()
        .map(|s| format!("// {}\n\n{}", s.name, s.content))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    let mut instruction = String::new();
    instruction.push_str("You are a helpful Unity AI Assistant. The user has loaded a Unity project. ");
    instruction.push_str("You have full access to the content of all scripts.\n\n");
    instruction.push_str("Current project scripts:\n");
    instruction.push_str(&script_context);
    instruction.push_str("\n\n");
    instruction.push_str("When asked to create or modify a script, you MUST respond with a single JSON object.\n");
    instruction.push_str(r#"For CREATING a script: Respond with { "explanation": "...", "code": "..." }."#);
    instruction.push('\n');
    instruction.push_str(
        r#"For EDITING a script: Respond with { "explanation": "...", "changes": ["...", "..."], "code": "..." }."#,
    );
    instruction.push('\n');
    instruction.push_str("Do not use markdown fences or any other text outside the JSON object.");
    instruction
}

/// JSON schema the backend must enforce on structured replies
pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "explanation": { "type": "string" },
            "code": { "type": "string" },
            "changes": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "required": ["explanation", "code"]
    })
}

/// Everything the backend needs for one structured request
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionRequest {
    pub system: String,
    pub prompt: String,
    pub schema: Value,
}

pub fn build_request(snapshot: &ProjectSnapshot, utterance: &str) -> SuggestionRequest {
    SuggestionRequest {
        system: system_instruction(snapshot),
        prompt: utterance.to_string(),
        schema: response_schema(),
    }
}

#[derive(Debug, Deserialize)]
struct SuggestionReply {
    explanation: String,
    code: String,
    #[serde(default)]
    changes: Option<Vec<String>>,
}

/// Interpret a structured reply. Fails if the text is not a JSON object with
/// string `explanation` and `code` fields.
pub fn parse_reply(raw: &str, kind: SuggestionKind, target_name: &str) -> serde_json::Result<Suggestion> {
    let reply: SuggestionReply = serde_json::from_str(raw.trim())?;
    Ok(Suggestion::pending(
        kind,
        target_name,
        reply.code,
        reply.explanation,
        reply.changes,
    ))
}

pub fn busy_reason(kind: SuggestionKind, target_name: &str) -> String {
    match kind {
        SuggestionKind::Create => format!("Generating {}...", target_name),
        SuggestionKind::Edit => format!("Analyzing {}...", target_name),
    }
}

impl Session {
    pub(crate) async fn request_suggestion(
        &mut self,
        utterance: &str,
        kind: SuggestionKind,
        target_name: &str,
    ) -> SendOutcome {
        self.set_busy(busy_reason(kind, target_name));

        // Built from the snapshot as it is now, never a cached context
        let request = build_request(&self.snapshot, utterance);
        let reply = self
            .backend
            .generate_structured(&request.system, &request.prompt, &request.schema)
            .await;

        let outcome = match reply {
            Ok(raw) => match parse_reply(&raw, kind, target_name) {
                Ok(suggestion) => {
                    info!(kind = kind.as_str(), target = %target_name, "suggestion ready for review");
                    let message_id = self.messages.push_suggestion(suggestion);
                    SendOutcome::Suggested { message_id }
                }
                Err(e) => {
                    warn!(error = %e, "structured reply was not valid JSON");
                    let message_id = self.messages.push(Sender::Assistant, APOLOGY);
                    SendOutcome::Apologized { message_id }
                }
            },
            Err(e) => {
                warn!(error = %e, "structured request failed");
                let message_id = self.messages.push(Sender::Assistant, APOLOGY);
                SendOutcome::Apologized { message_id }
            }
        };

        self.clear_busy();
        outcome
    }
}
