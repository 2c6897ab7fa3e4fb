use super::lines::response_lines;
use super::{AiBackend, TextStream};
use crate::state::ChatMessage;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::future;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a Value>,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaResponseMessage>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    fn messages(system: &str, history: &[ChatMessage]) -> Vec<OllamaMessage> {
        let mut messages = vec![OllamaMessage {
            role: "system".to_string(),
            content: system.to_string(),
        }];
        messages.extend(history.iter().map(|m| OllamaMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        }));
        messages
    }

    async fn post_chat(&self, request: &OllamaChatRequest<'_>) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Ollama request failed with status: {} {}. Make sure Ollama is running with: ollama serve",
                status,
                text
            ));
        }
        Ok(response)
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to list models: {}", response.status()));
        }

        let models_response: OllamaModelsResponse = response.json().await?;
        let model_names: Vec<String> = models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect();

        Ok(model_names)
    }
}

/// Text delta carried by one NDJSON line of a streamed `/api/chat` reply
/// One decoded NDJSON chunk of a streamed chat reply
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct OllamaDelta {
    pub text: String,
    /// Set on the final chunk of the reply
    pub done: bool,
}

pub(crate) fn parse_stream_line(line: &str) -> Option<Result<OllamaDelta>> {
    if line.trim().is_empty() {
        return None;
    }
    let chunk: OllamaChatResponse = match serde_json::from_str(line) {
        Ok(chunk) => chunk,
        Err(e) => return Some(Err(anyhow!("Malformed Ollama stream chunk: {}", e))),
    };
    if let Some(error) = chunk.error {
        return Some(Err(anyhow!("Ollama error: {}", error)));
    }
    Some(Ok(OllamaDelta {
        text: chunk.message.map(|m| m.content).unwrap_or_default(),
        done: chunk.done,
    }))
}

/// Text deltas of an NDJSON body; the stream ends at the `done` chunk
pub(crate) fn ndjson_deltas(lines: BoxStream<'static, Result<String>>) -> TextStream {
    lines
        .filter_map(|line| async move {
            match line {
                Ok(line) => parse_stream_line(&line),
                Err(e) => Some(Err(e)),
            }
        })
        .scan(false, |finished, chunk| {
            if *finished {
                return future::ready(None);
            }
            *finished = matches!(chunk, Ok(OllamaDelta { done: true, .. }));
            future::ready(Some(chunk))
        })
        .filter_map(|chunk| async move {
            match chunk {
                Ok(delta) if delta.text.is_empty() => None,
                Ok(delta) => Some(Ok(delta.text)),
                Err(e) => Some(Err(e)),
            }
        })
        .boxed()
}

#[async_trait]
impl AiBackend for OllamaClient {
    async fn generate_structured(&self, system: &str, prompt: &str, schema: &Value) -> Result<String> {
        let request = OllamaChatRequest {
            model: &self.model,
            messages: Self::messages(system, &[ChatMessage::user(prompt)]),
            stream: false,
            format: Some(schema),
        };

        let response = self.post_chat(&request).await?;
        let ollama_response: OllamaChatResponse = response.json().await?;
        if let Some(error) = ollama_response.error {
            return Err(anyhow!("Ollama error: {}", error));
        }
        Ok(ollama_response.message.map(|m| m.content).unwrap_or_default())
    }

    async fn stream_chat(&self, system: &str, history: &[ChatMessage]) -> Result<TextStream> {
        let request = OllamaChatRequest {
            model: &self.model,
            messages: Self::messages(system, history),
            stream: true,
            format: None,
        };

        let response = self.post_chat(&request).await?;
        Ok(ndjson_deltas(response_lines(response)))
    }
}
