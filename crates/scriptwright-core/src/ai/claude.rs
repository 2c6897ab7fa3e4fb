use super::lines::{response_lines, sse_data};
use super::{AiBackend, TextStream};
use crate::state::ChatMessage;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const SUGGESTION_TOOL: &str = "propose_file";

#[derive(Serialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeContent {
    ToolUse {
        input: Value,
    },
    /// Text and thinking blocks; only the tool input is used
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeStreamEvent {
    ContentBlockDelta { delta: ClaudeDelta },
    Error { error: ClaudeError },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ClaudeDelta {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ClaudeError {
    message: String,
}

#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    api_key: String,
    model: String,
}

impl ClaudeClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    fn messages(history: &[ChatMessage]) -> Vec<ClaudeMessage> {
        history
            .iter()
            .map(|m| ClaudeMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    async fn post(&self, request: &ClaudeRequest<'_>) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Claude API error {}: {}", status, text));
        }
        Ok(response)
    }

    pub fn list_models() -> Vec<String> {
        vec![
            "claude-sonnet-4-20250514".to_string(),
            "claude-3-5-sonnet-20241022".to_string(),
            "claude-3-5-haiku-20241022".to_string(),
            "claude-3-opus-20240229".to_string(),
        ]
    }
}

pub(crate) fn parse_stream_line(line: &str) -> Option<Result<String>> {
    let data = sse_data(line)?;
    match serde_json::from_str::<ClaudeStreamEvent>(data) {
        Ok(ClaudeStreamEvent::ContentBlockDelta { delta }) if !delta.text.is_empty() => Some(Ok(delta.text)),
        Ok(ClaudeStreamEvent::Error { error }) => Some(Err(anyhow!("Claude stream error: {}", error.message))),
        Ok(_) => None,
        Err(e) => Some(Err(anyhow!("Malformed Claude stream event: {}", e))),
    }
}

#[async_trait]
impl AiBackend for ClaudeClient {
    /// The schema is enforced by forcing a single tool call whose input
    /// schema is the response schema; the tool input is the reply.
    async fn generate_structured(&self, system: &str, prompt: &str, schema: &Value) -> Result<String> {
        let request = ClaudeRequest {
            model: &self.model,
            max_tokens: 8192,
            system,
            messages: Self::messages(&[ChatMessage::user(prompt)]),
            stream: false,
            tools: Some(json!([{
                "name": SUGGESTION_TOOL,
                "description": "Return the proposed file contents.",
                "input_schema": schema,
            }])),
            tool_choice: Some(json!({ "type": "tool", "name": SUGGESTION_TOOL })),
        };

        let response = self.post(&request).await?;
        let claude_response: ClaudeResponse = response.json().await?;
        claude_response
            .content
            .into_iter()
            .find_map(|block| match block {
                ClaudeContent::ToolUse { input } => Some(input.to_string()),
                _ => None,
            })
            .ok_or_else(|| anyhow!("Claude reply contained no {} call", SUGGESTION_TOOL))
    }

    async fn stream_chat(&self, system: &str, history: &[ChatMessage]) -> Result<TextStream> {
        let request = ClaudeRequest {
            model: &self.model,
            max_tokens: 4096,
            system,
            messages: Self::messages(history),
            stream: true,
            tools: None,
            tool_choice: None,
        };

        let response = self.post(&request).await?;
        let deltas = response_lines(response).filter_map(|line| async move {
            match line {
                Ok(line) => parse_stream_line(&line),
                Err(e) => Some(Err(e)),
            }
        });
        Ok(deltas.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_delta() {
        let line = r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"lo "}}"#;
        assert_eq!(parse_stream_line(line).unwrap().unwrap(), "lo ");
    }

    #[test]
    fn test_ignores_other_events() {
        assert!(parse_stream_line("event: message_start").is_none());
        assert!(parse_stream_line(r#"data: {"type":"message_stop"}"#).is_none());
        assert!(parse_stream_line(r#"data: {"type":"ping"}"#).is_none());
    }

    #[test]
    fn test_error_event() {
        let line = r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let err = parse_stream_line(line).unwrap().unwrap_err();
        assert!(err.to_string().contains("Overloaded"));
    }

    #[test]
    fn test_tool_use_content_deserializes() {
        let body = r#"{"content":[{"type":"text","text":"Here you go"},{"type":"tool_use","id":"t1","name":"propose_file","input":{"code":"x","explanation":"y"}}]}"#;
        let response: ClaudeResponse = serde_json::from_str(body).unwrap();
        assert!(matches!(response.content[0], ClaudeContent::Other));
        assert!(matches!(response.content[1], ClaudeContent::ToolUse { .. }));
    }
}
