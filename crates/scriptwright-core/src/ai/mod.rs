pub mod claude;
pub mod gemini;
pub mod lines;
pub mod ollama;
pub mod openai;

pub use claude::ClaudeClient;
pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use openai::OpenAIClient;

use crate::state::ChatMessage;
use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::Value;

/// Incremental text deltas of a streamed reply
pub type TextStream = BoxStream<'static, Result<String>>;

/// A generative AI provider, invoked either for one schema-constrained
/// JSON document or for a streamed conversational reply.
#[async_trait]
pub trait AiBackend: Send + Sync {
    /// Single non-streaming request whose reply must conform to `schema`.
    /// Returns the raw reply text; interpreting it is the caller's job.
    async fn generate_structured(&self, system: &str, prompt: &str, schema: &Value) -> Result<String>;

    /// Stream a reply to the last turn of `history`
    async fn stream_chat(&self, system: &str, history: &[ChatMessage]) -> Result<TextStream>;
}
