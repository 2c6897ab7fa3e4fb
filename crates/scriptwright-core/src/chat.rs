//! Free-form conversation with incrementally streamed replies.

use crate::session::{SendOutcome, Session};
use crate::state::{ChatMessage, Sender};
use anyhow::{anyhow, Result};
use futures_util::StreamExt;
use tracing::{debug, warn};

/// Shown after the partial reply while a stream is still running
pub const CURSOR: char = '▍';
pub const STREAM_FAILURE_NOTICE: &str = "Sorry, an error occurred.";
pub const THINKING_MESSAGE: &str = "Thinking...";

/// A conversation bound to the system context it was created with
#[derive(Debug, Clone)]
pub struct ChatSession {
    system: String,
    history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(system: String) -> Self {
        Self {
            system,
            history: Vec::new(),
        }
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Prior turns followed by the new user turn
    fn turn(&self, utterance: &str) -> Vec<ChatMessage> {
        let mut turn = self.history.clone();
        turn.push(ChatMessage::user(utterance));
        turn
    }

    fn record(&mut self, utterance: &str, reply: &str) {
        self.history.push(ChatMessage::user(utterance));
        self.history.push(ChatMessage::assistant(reply));
    }
}

/// Accumulator over the deltas of one streamed reply
#[derive(Debug, Default)]
pub struct StreamFold {
    text: String,
}

impl StreamFold {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &str) {
        self.text.push_str(delta);
    }

    /// What the message shows while more deltas may follow
    pub fn in_progress(&self) -> String {
        format!("{}{}", self.text, CURSOR)
    }

    pub fn finish(self) -> String {
        self.text
    }
}

impl Session {
    pub(crate) async fn stream_reply(&mut self, utterance: &str) -> SendOutcome {
        self.set_busy(THINKING_MESSAGE);
        let message_id = self.messages.push(Sender::Assistant, CURSOR.to_string());
        self.publish();

        let outcome = match self.fold_stream(&message_id, utterance).await {
            Ok(reply) => {
                debug!(chars = reply.len(), "stream complete");
                self.messages.set_text(&message_id, reply.as_str());
                if let Some(chat) = self.chat.as_mut() {
                    chat.record(utterance, &reply);
                }
                SendOutcome::Replied { message_id }
            }
            Err(e) => {
                // Partial text is dropped so a failed reply never reads as a short answer
                warn!(error = %e, "streaming chat failed");
                self.messages.set_text(&message_id, STREAM_FAILURE_NOTICE);
                SendOutcome::ReplyFailed { message_id }
            }
        };

        self.clear_busy();
        outcome
    }

    async fn fold_stream(&mut self, message_id: &str, utterance: &str) -> Result<String> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| anyhow!("No conversation is open"))?;
        let system = chat.system().to_string();
        let turn = chat.turn(utterance);

        let mut stream = self.backend.stream_chat(&system, &turn).await?;
        let mut fold = StreamFold::new();
        while let Some(delta) = stream.next().await {
            fold.push(&delta?);
            self.messages.set_text(message_id, fold.in_progress());
            self.publish();
        }
        Ok(fold.finish())
    }
}
