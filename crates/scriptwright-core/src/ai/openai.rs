use super::lines::{response_lines, sse_data};
use super::{AiBackend, TextStream};
use crate::state::ChatMessage;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIDelta,
}

#[derive(Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenAIClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    fn messages(system: &str, history: &[ChatMessage]) -> Vec<OpenAIMessage> {
        let mut messages = vec![OpenAIMessage {
            role: "system".to_string(),
            content: system.to_string(),
        }];
        messages.extend(history.iter().map(|m| OpenAIMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        }));
        messages
    }

    async fn post(&self, request: &OpenAIRequest<'_>) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(COMPLETIONS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error {}: {}", status, text));
        }
        Ok(response)
    }

    pub fn list_models() -> Vec<String> {
        vec![
            "gpt-4o".to_string(),
            "gpt-4o-mini".to_string(),
            "gpt-4-turbo".to_string(),
        ]
    }
}

pub(crate) fn parse_stream_line(line: &str) -> Option<Result<String>> {
    let data = sse_data(line)?;
    if data == "[DONE]" {
        return None;
    }
    match serde_json::from_str::<OpenAIStreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map(Ok),
        Err(e) => Some(Err(anyhow!("Malformed OpenAI stream chunk: {}", e))),
    }
}

#[async_trait]
impl AiBackend for OpenAIClient {
    async fn generate_structured(&self, system: &str, prompt: &str, schema: &Value) -> Result<String> {
        let request = OpenAIRequest {
            model: &self.model,
            messages: Self::messages(system, &[ChatMessage::user(prompt)]),
            stream: false,
            response_format: Some(json!({
                "type": "json_schema",
                "json_schema": { "name": "file_suggestion", "schema": schema },
            })),
        };

        let response = self.post(&request).await?;
        let openai_response: OpenAIResponse = response.json().await?;
        Ok(openai_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn stream_chat(&self, system: &str, history: &[ChatMessage]) -> Result<TextStream> {
        let request = OpenAIRequest {
            model: &self.model,
            messages: Self::messages(system, history),
            stream: true,
            response_format: None,
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
