use super::lines::{response_lines, sse_data};
use super::{AiBackend, TextStream};
use crate::state::{ChatMessage, ChatRole};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    system_instruction: Value,
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<Value>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

impl GeminiResponse {
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    fn request(system: &str, history: &[ChatMessage], generation_config: Option<Value>) -> GeminiRequest {
        GeminiRequest {
            system_instruction: json!({ "parts": [{ "text": system }] }),
            contents: history
                .iter()
                .map(|m| GeminiContent {
                    role: match m.role {
                        ChatRole::User => "user",
                        ChatRole::Assistant => "model",
                    },
                    parts: vec![GeminiPart {
                        text: m.content.clone(),
                    }],
                })
                .collect(),
            generation_config,
        }
    }

    async fn post(&self, url: &str, request: &GeminiRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini API error {}: {}", status, text));
        }
        Ok(response)
    }

    pub fn list_models() -> Vec<String> {
        vec![
            "gemini-2.5-flash".to_string(),
            "gemini-2.5-pro".to_string(),
            "gemini-2.0-flash".to_string(),
        ]
    }
}

pub(crate) fn parse_stream_line(line: &str) -> Option<Result<String>> {
    let data = sse_data(line)?;
    match serde_json::from_str::<GeminiResponse>(data) {
        Ok(chunk) => Some(chunk.text()).filter(|text| !text.is_empty()).map(Ok),
        Err(e) => Some(Err(anyhow!("Malformed Gemini stream chunk: {}", e))),
    }
}

#[async_trait]
impl AiBackend for GeminiClient {
    async fn generate_structured(&self, system: &str, prompt: &str, schema: &Value) -> Result<String> {
        let url = format!("{}/{}:generateContent", API_BASE, self.model);
        let request = Self::request(
            system,
            &[ChatMessage::user(prompt)],
            Some(json!({
                "responseMimeType": "application/json",
                "responseJsonSchema": schema,
            })),
        );

        let response = self.post(&url, &request).await?;
        let gemini_response: GeminiResponse = response.json().await?;
        Ok(gemini_response.text())
    }

    async fn stream_chat(&self, system: &str, history: &[ChatMessage]) -> Result<TextStream> {
        let url = format!("{}/{}:streamGenerateContent?alt=sse", API_BASE, self.model);
        let request = Self::request(system, history, None);

        let response = self.post(&url, &request).await?;
        let deltas = response_lines(response).filter_map(|line| async move {
            match line {
                Ok(line) => parse_stream_line(&line),
                Err(e) => Some(Err(e)),
            }
        });
        Ok(deltas.boxed())
    }
}
