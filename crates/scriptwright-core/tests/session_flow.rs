use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use scriptwright_core::{
    ActOutcome, AiBackend, ChatMessage, Decision, FileCapability, FolderCapability, FolderPicker, NoticeKind,
    Observer, Phase, PickError, Sender, SendOutcome, Session, SuggestionKind, SuggestionStatus, TextStream,
};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

// In-memory project folder

#[derive(Clone, Default)]
struct MemoryFolder {
    files: Arc<Mutex<BTreeMap<String, String>>>,
    writes: Arc<Mutex<usize>>,
    fail_writes: bool,
}

impl MemoryFolder {
    fn with_files(files: &[(&str, &str)]) -> Self {
        let folder = Self::default();
        {
            let mut map = folder.files.lock().unwrap();
            for (name, content) in files {
                map.insert(name.to_string(), content.to_string());
            }
        }
        folder
    }

    fn content(&self, name: &str) -> Option<String> {
        self.files.lock().unwrap().get(name).cloned()
    }

    fn write_count(&self) -> usize {
        *self.writes.lock().unwrap()
    }
}

struct MemoryFile {
    folder: MemoryFolder,
    name: String,
}

#[async_trait]
impl FileCapability for MemoryFile {
    async fn read_text(&self) -> Result<String> {
        self.folder
            .content(&self.name)
            .ok_or_else(|| anyhow!("{} vanished", self.name))
    }

    async fn write_text(&self, content: &str) -> Result<()> {
        *self.folder.writes.lock().unwrap() += 1;
        if self.folder.fail_writes {
            return Err(anyhow!("read-only volume"));
        }
        self.folder
            .files
            .lock()
            .unwrap()
            .insert(self.name.clone(), content.to_string());
        Ok(())
    }
}

#[async_trait]
impl FolderCapability for MemoryFolder {
    fn label(&self) -> String {
        "memory://project".to_string()
    }

    async fn file_names(&self) -> Result<Vec<String>> {
        Ok(self.files.lock().unwrap().keys().cloned().collect())
    }

    async fn file(&self, name: &str, create: bool) -> Result<Box<dyn FileCapability>> {
        if !create && self.content(name).is_none() {
            return Err(anyhow!("{} not found", name));
        }
        Ok(Box::new(MemoryFile {
            folder: self.clone(),
            name: name.to_string(),
        }))
    }
}

struct Grant(Option<MemoryFolder>);

#[async_trait]
impl FolderPicker for Grant {
    async fn pick(&mut self) -> std::result::Result<Box<dyn FolderCapability>, PickError> {
        self.0
            .take()
            .map(|f| Box::new(f) as Box<dyn FolderCapability>)
            .ok_or(PickError::Cancelled)
    }
}

// Scripted AI backend

#[derive(Default)]
struct Script {
    structured: VecDeque<Result<String>>,
    streams: VecDeque<Vec<Result<String>>>,
    structured_systems: Vec<String>,
    stream_histories: Vec<Vec<ChatMessage>>,
}

#[derive(Clone, Default)]
struct ScriptedBackend(Arc<Mutex<Script>>);

impl ScriptedBackend {
    fn reply_json(&self, raw: &str) {
        self.0.lock().unwrap().structured.push_back(Ok(raw.to_string()));
    }

    fn fail_structured(&self) {
        self.0.lock().unwrap().structured.push_back(Err(anyhow!("connection refused")));
    }

    fn stream(&self, deltas: Vec<Result<String>>) {
        self.0.lock().unwrap().streams.push_back(deltas);
    }

    fn structured_systems(&self) -> Vec<String> {
        self.0.lock().unwrap().structured_systems.clone()
    }

    fn stream_histories(&self) -> Vec<Vec<ChatMessage>> {
        self.0.lock().unwrap().stream_histories.clone()
    }
}

#[async_trait]
impl AiBackend for ScriptedBackend {
    async fn generate_structured(&self, system: &str, _prompt: &str, _schema: &Value) -> Result<String> {
        let mut script = self.0.lock().unwrap();
        script.structured_systems.push(system.to_string());
        script
            .structured
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted reply")))
    }

    async fn stream_chat(&self, _system: &str, history: &[ChatMessage]) -> Result<TextStream> {
        let mut script = self.0.lock().unwrap();
        script.stream_histories.push(history.to_vec());
        let deltas = script
            .streams
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted stream"))?;
        Ok(futures_util::stream::iter(deltas).boxed())
    }
}

/// Records the text of the newest message every time the session publishes
#[derive(Clone, Default)]
struct LastTextRecorder(Arc<Mutex<Vec<String>>>);

impl Observer for LastTextRecorder {
    fn publish(&self, session: &Session) {
        if let Some(last) = session.messages().last() {
            self.0.lock().unwrap().push(last.text.clone());
        }
    }
}

async fn ready_session(folder: MemoryFolder, backend: ScriptedBackend) -> Session {
    let mut session = Session::new(Box::new(backend), true);
    session.select(&mut Grant(Some(folder))).await;
    assert_eq!(session.phase(), Phase::Ready);
    session
}

fn suggestion_status(session: &Session, message_id: &str) -> Option<SuggestionStatus> {
    session
        .messages()
        .get(message_id)
        .and_then(|m| m.suggestion.as_ref())
        .map(|s| s.status())
}

#[tokio::test]
async fn test_edit_suggestion_approved_and_written() {
    let folder = MemoryFolder::with_files(&[("Player.cs", "// old")]);
    let backend = ScriptedBackend::default();
    backend.reply_json(r#"{"explanation":"Added jump","code":"// new","changes":["Added Jump() method"]}"#);
    let mut session = ready_session(folder.clone(), backend.clone()).await;

    let outcome = session.send_message("update Player.cs to add jumping").await;
    let SendOutcome::Suggested { message_id } = outcome else {
        panic!("expected a suggestion, got {:?}", outcome);
    };

    let message = session.messages().get(&message_id).unwrap();
    assert_eq!(message.sender, Sender::Assistant);
    assert_eq!(message.text, "");
    let suggestion = message.suggestion.as_ref().unwrap();
    assert_eq!(suggestion.kind, SuggestionKind::Edit);
    assert_eq!(suggestion.target_name, "Player.cs");
    assert_eq!(suggestion.status(), SuggestionStatus::Pending);
    assert_eq!(suggestion.changes, Some(vec!["Added Jump() method".to_string()]));
    assert!(backend.structured_systems()[0].contains("// Player.cs\n\n// old"));

    assert_eq!(session.act(&message_id, Decision::Approved).await, ActOutcome::Saved);
    assert_eq!(folder.content("Player.cs").as_deref(), Some("// new"));
    assert_eq!(
        session.snapshot().get("Player.cs").map(|s| s.content.as_str()),
        Some("// new")
    );
    assert_eq!(suggestion_status(&session, &message_id), Some(SuggestionStatus::Approved));
    assert_eq!(session.notice().map(|n| n.kind), Some(NoticeKind::Success));
    assert_eq!(session.notice().map(|n| n.text.as_str()), Some("Player.cs saved successfully!"));
    assert!(!session.is_busy());
}

#[tokio::test]
async fn test_second_action_is_noop() {
    let folder = MemoryFolder::with_files(&[("Player.cs", "// old")]);
    let backend = ScriptedBackend::default();
    backend.reply_json(r#"{"explanation":"x","code":"// v2"}"#);
    let mut session = ready_session(folder.clone(), backend).await;

    let SendOutcome::Suggested { message_id } = session.send_message("rewrite Player.cs").await else {
        panic!("expected a suggestion");
    };
    session.act(&message_id, Decision::Approved).await;
    assert_eq!(folder.write_count(), 1);

    assert_eq!(session.act(&message_id, Decision::Declined).await, ActOutcome::Ignored);
    assert_eq!(session.act(&message_id, Decision::Approved).await, ActOutcome::Ignored);
    assert_eq!(suggestion_status(&session, &message_id), Some(SuggestionStatus::Approved));
    assert_eq!(folder.write_count(), 1);
}

#[tokio::test]
async fn test_decline_never_writes() {
    let folder = MemoryFolder::with_files(&[("Player.cs", "// old")]);
    let backend = ScriptedBackend::default();
    backend.reply_json(r#"{"explanation":"x","code":"// nope"}"#);
    let mut session = ready_session(folder.clone(), backend).await;

    let SendOutcome::Suggested { message_id } = session.send_message("change Player.cs").await else {
        panic!("expected a suggestion");
    };
    assert_eq!(session.act(&message_id, Decision::Declined).await, ActOutcome::Declined);
    assert_eq!(suggestion_status(&session, &message_id), Some(SuggestionStatus::Declined));
    assert_eq!(folder.write_count(), 0);
    assert_eq!(folder.content("Player.cs").as_deref(), Some("// old"));
    assert!(session.notice().is_none());
}

#[tokio::test]
async fn test_act_on_plain_or_unknown_message_is_noop() {
    let folder = MemoryFolder::with_files(&[]);
    let mut session = ready_session(folder.clone(), ScriptedBackend::default()).await;
    let greeting_id = session.messages().last().unwrap().id.clone();

    assert_eq!(session.act(&greeting_id, Decision::Approved).await, ActOutcome::Ignored);
    assert_eq!(session.act("no-such-id", Decision::Approved).await, ActOutcome::Ignored);
    assert_eq!(folder.write_count(), 0);
}

#[tokio::test]
async fn test_malformed_json_appends_apology() {
    let folder = MemoryFolder::with_files(&[("Player.cs", "// old")]);
    let backend = ScriptedBackend::default();
    backend.reply_json("```json\n{\"code\": \"oops\"\n```");
    let mut session = ready_session(folder, backend).await;
    let before = session.messages().len();

    let outcome = session.send_message("edit Player.cs").await;
    assert!(matches!(outcome, SendOutcome::Apologized { .. }));

    // user message + apology
    assert_eq!(session.messages().len(), before + 2);
    let apology = session.messages().last().unwrap();
    assert_eq!(apology.sender, Sender::Assistant);
    assert!(apology.suggestion.is_none());
    assert!(!apology.text.is_empty());
    assert_eq!(session.phase(), Phase::Ready);
    assert!(!session.is_busy());
}

#[tokio::test]
async fn test_structured_transport_failure_appends_apology() {
    let backend = ScriptedBackend::default();
    backend.fail_structured();
    let mut session = ready_session(MemoryFolder::default(), backend).await;

    let outcome = session.send_message("create Enemy.cs").await;
    assert!(matches!(outcome, SendOutcome::Apologized { .. }));
    assert_eq!(session.phase(), Phase::Ready);
}

#[tokio::test]
async fn test_empty_folder_is_ready_and_usable() {
    let folder = MemoryFolder::default();
    let backend = ScriptedBackend::default();
    backend.reply_json(r#"{"explanation":"A new spawner","code":"class Spawner {}"}"#);
    backend.stream(vec![Ok("Sure.".to_string())]);
    let mut session = ready_session(folder.clone(), backend).await;

    let greeting = session.messages().last().unwrap();
    assert_eq!(greeting.sender, Sender::Assistant);
    assert!(greeting.text.contains("scanned 0 C# scripts"));
    assert!(session.snapshot().is_empty());

    let SendOutcome::Suggested { message_id } = session.send_message("create Spawner.cs").await else {
        panic!("expected a suggestion");
    };
    let kind = session.messages().get(&message_id).unwrap().suggestion.as_ref().unwrap().kind;
    assert_eq!(kind, SuggestionKind::Create);

    assert_eq!(session.act(&message_id, Decision::Approved).await, ActOutcome::Saved);
    assert_eq!(session.snapshot().len(), 1);
    assert_eq!(
        session.snapshot().get("Spawner.cs").map(|s| s.content.as_str()),
        Some("class Spawner {}")
    );

    let outcome = session.send_message("what should I build next?").await;
    assert!(matches!(outcome, SendOutcome::Replied { .. }));
}

#[tokio::test]
async fn test_stream_passes_through_cursor_states() {
    let backend = ScriptedBackend::default();
    backend.stream(vec![Ok("Hel".into()), Ok("lo ".into()), Ok("world".into())]);
    let recorder = LastTextRecorder::default();

    let mut session = Session::new(Box::new(backend), true).with_observer(recorder.clone());
    session.select(&mut Grant(Some(MemoryFolder::default()))).await;
    recorder.0.lock().unwrap().clear();

    let SendOutcome::Replied { message_id } = session.send_message("how do coroutines work?").await else {
        panic!("expected a streamed reply");
    };
    assert_eq!(session.messages().get(&message_id).unwrap().text, "Hello world");

    let seen = recorder.0.lock().unwrap().clone();
    let position = |text: &str| seen.iter().position(|t| t == text);
    let steps = ["▍", "Hel▍", "Hello ▍", "Hello world▍", "Hello world"].map(position);
    assert!(steps.iter().all(Option::is_some), "missing states in {:?}", seen);
    assert!(steps.windows(2).all(|w| w[0] < w[1]), "out of order: {:?}", seen);
}

#[tokio::test]
async fn test_stream_failure_replaces_partial_text() {
    let backend = ScriptedBackend::default();
    backend.stream(vec![Ok("Partial ans".into()), Err(anyhow!("connection reset"))]);
    let mut session = ready_session(MemoryFolder::default(), backend.clone()).await;

    let SendOutcome::ReplyFailed { message_id } = session.send_message("explain quaternions").await else {
        panic!("expected stream failure");
    };
    assert_eq!(
        session.messages().get(&message_id).unwrap().text,
        "Sorry, an error occurred."
    );
    assert!(!session.is_busy());
    assert!(session.chat().unwrap().history().is_empty());
}

#[tokio::test]
async fn test_conversation_keeps_history() {
    let backend = ScriptedBackend::default();
    backend.stream(vec![Ok("A prefab is a template.".into())]);
    backend.stream(vec![Ok("Yes.".into())]);
    let mut session = ready_session(MemoryFolder::default(), backend.clone()).await;

    session.send_message("what is a prefab?").await;
    session.send_message("can prefabs be nested?").await;

    let histories = backend.stream_histories();
    assert_eq!(histories[0], vec![ChatMessage::user("what is a prefab?")]);
    assert_eq!(
        histories[1],
        vec![
            ChatMessage::user("what is a prefab?"),
            ChatMessage::assistant("A prefab is a template."),
            ChatMessage::user("can prefabs be nested?"),
        ]
    );
}

#[tokio::test]
async fn test_write_failure_keeps_approval_and_snapshot() {
    let mut folder = MemoryFolder::with_files(&[("Player.cs", "// old")]);
    folder.fail_writes = true;
    let backend = ScriptedBackend::default();
    backend.reply_json(r#"{"explanation":"x","code":"// new"}"#);
    let mut session = ready_session(folder.clone(), backend).await;

    let SendOutcome::Suggested { message_id } = session.send_message("optimize Player.cs").await else {
        panic!("expected a suggestion");
    };
    assert_eq!(session.act(&message_id, Decision::Approved).await, ActOutcome::SaveFailed);

    assert_eq!(suggestion_status(&session, &message_id), Some(SuggestionStatus::Approved));
    assert_eq!(session.notice().map(|n| n.kind), Some(NoticeKind::Failure));
    assert_eq!(session.notice().map(|n| n.text.as_str()), Some("Error saving Player.cs."));
    assert_eq!(
        session.snapshot().get("Player.cs").map(|s| s.content.as_str()),
        Some("// old")
    );
    assert!(!session.is_busy());
}

#[tokio::test]
async fn test_context_reflects_approved_write() {
    let folder = MemoryFolder::with_files(&[("Player.cs", "// old")]);
    let backend = ScriptedBackend::default();
    backend.reply_json(r#"{"explanation":"x","code":"// fresh"}"#);
    backend.reply_json(r#"{"explanation":"y","code":"// fresher"}"#);
    let mut session = ready_session(folder, backend.clone()).await;

    let SendOutcome::Suggested { message_id } = session.send_message("update Player.cs").await else {
        panic!("expected a suggestion");
    };
    session.act(&message_id, Decision::Approved).await;
    session.send_message("update Player.cs again").await;

    let systems = backend.structured_systems();
    assert!(systems[1].contains("// fresh"));
    assert!(!systems[1].contains("// old"));
    assert!(session.chat().unwrap().system().contains("// fresh"));
}

#[tokio::test]
async fn test_cancelled_selection_stays_selecting() {
    let mut session = Session::new(Box::new(ScriptedBackend::default()), true);
    session.select(&mut Grant(None)).await;
    assert_eq!(session.phase(), Phase::Selecting);
    assert!(session.last_error().is_none());
}
