pub mod ai;
pub mod chat;
pub mod config;
pub mod intent;
pub mod lifecycle;
pub mod project;
pub mod provider;
pub mod session;
pub mod state;
pub mod suggestion;

// Re-export main types for convenience
pub use ai::{AiBackend, ClaudeClient, GeminiClient, OllamaClient, OpenAIClient, TextStream};
pub use chat::{ChatSession, CURSOR};
pub use config::Config;
pub use intent::{Intent, IntentClassifier};
pub use lifecycle::ActOutcome;
pub use project::{
    FileCapability, FolderCapability, FolderPicker, LocalFolder, PathPicker, PickError, ProjectSnapshot,
    ScriptRecord, SCRIPT_EXTENSION, SCRIPT_LANGUAGE,
};
pub use provider::Provider;
pub use session::{Notice, NoticeKind, Observer, Phase, SelectionError, SendOutcome, Session};
pub use state::{
    ChatMessage, ChatRole, Decision, Message, MessageLog, Sender, Suggestion, SuggestionKind, SuggestionStatus,
};
