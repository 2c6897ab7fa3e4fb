//! Application lifecycle: folder selection, scanning, and the ready state in
//! which messages are exchanged.
//!
//! All mutations go through named operations on [`Session`]; after each
//! observable change the session is handed to its [`Observer`].

use crate::ai::AiBackend;
use crate::chat::ChatSession;
use crate::intent::{Intent, IntentClassifier};
use crate::project::{FolderCapability, FolderPicker, PickError, ProjectSnapshot, ScriptRecord, SCRIPT_LANGUAGE};
use crate::state::{MessageLog, Sender};
use crate::suggestion::system_instruction;
use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const SCANNING_MESSAGE: &str = "Scanning project files...";
pub const NOTICE_TTL: Duration = Duration::from_secs(3);

/// Descriptions by which a host environment reports that it forbids the
/// folder picker outright
const RESTRICTED_SIGNATURES: &[&str] = &["Cross origin sub frames", "Operation not permitted"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The environment cannot grant folder access at all
    Unsupported,
    Selecting,
    Scanning,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error(
        "Host Environment Error: This app is running in a restricted context that blocks the folder picker. \
         This is a security feature of the host environment. The app requested permission, but it was denied. \
         This is not a bug in the app, but a limitation of the platform it's running on."
    )]
    Restricted,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

pub fn classify_pick_failure(description: &str) -> SelectionError {
    if RESTRICTED_SIGNATURES.iter().any(|sig| description.contains(sig)) {
        SelectionError::Restricted
    } else {
        SelectionError::Unexpected(description.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Failure,
}

/// Transient, auto-dismissing user-facing notice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub kind: NoticeKind,
    raised_at: Instant,
}

impl Notice {
    pub fn new(kind: NoticeKind, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind,
            raised_at: Instant::now(),
        }
    }

    pub fn is_visible_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.raised_at) < NOTICE_TTL
    }
}

/// Receives the session after every observable mutation
pub trait Observer: Send + Sync {
    fn publish(&self, session: &Session);
}

pub struct NoopObserver;

impl Observer for NoopObserver {
    fn publish(&self, _session: &Session) {}
}

/// Result of a chat submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Not ready, busy, or nothing to send
    Ignored,
    /// A suggestion message was appended
    Suggested { message_id: String },
    /// The structured reply was unusable; an apology was appended
    Apologized { message_id: String },
    Replied { message_id: String },
    ReplyFailed { message_id: String },
}

pub struct Session {
    pub(crate) phase: Phase,
    pub(crate) folder: Option<Box<dyn FolderCapability>>,
    pub(crate) snapshot: ProjectSnapshot,
    pub(crate) messages: MessageLog,
    pub(crate) busy: Option<String>,
    last_error: Option<SelectionError>,
    notice: Option<Notice>,
    displayed: Option<String>,
    pub(crate) chat: Option<ChatSession>,
    classifier: IntentClassifier,
    pub(crate) backend: Box<dyn AiBackend>,
    observer: Box<dyn Observer>,
}

impl Session {
    pub fn new(backend: Box<dyn AiBackend>, folder_access_available: bool) -> Self {
        let phase = if folder_access_available {
            Phase::Selecting
        } else {
            Phase::Unsupported
        };
        info!(?phase, "session created");

        Self {
            phase,
            folder: None,
            snapshot: ProjectSnapshot::empty(),
            messages: MessageLog::new(),
            busy: None,
            last_error: None,
            notice: None,
            displayed: None,
            chat: None,
            classifier: IntentClassifier::default(),
            backend,
            observer: Box::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: impl Observer + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn with_classifier(mut self, classifier: IntentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    pub fn snapshot(&self) -> &ProjectSnapshot {
        &self.snapshot
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_some()
    }

    pub fn busy_reason(&self) -> Option<&str> {
        self.busy.as_deref()
    }

    pub fn last_error(&self) -> Option<&SelectionError> {
        self.last_error.as_ref()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn active_notice(&self, now: Instant) -> Option<&Notice> {
        self.notice.as_ref().filter(|n| n.is_visible_at(now))
    }

    pub fn folder_label(&self) -> Option<String> {
        self.folder.as_ref().map(|f| f.label())
    }

    pub fn chat(&self) -> Option<&ChatSession> {
        self.chat.as_ref()
    }

    /// Script currently shown in the code viewer, read from the live snapshot
    pub fn displayed_script(&self) -> Option<&ScriptRecord> {
        self.displayed.as_deref().and_then(|name| self.snapshot.get(name))
    }

    /// Show `name` in the code viewer; returns false if it is not in the snapshot
    pub fn display_script(&mut self, name: &str) -> bool {
        if self.snapshot.get(name).is_none() {
            return false;
        }
        self.displayed = Some(name.to_string());
        self.publish();
        true
    }

    /// Ask `picker` for a folder grant and, once granted, scan it and enter
    /// the ready state. Only meaningful while selecting.
    pub async fn select(&mut self, picker: &mut dyn FolderPicker) {
        if self.phase != Phase::Selecting {
            debug!(phase = ?self.phase, "folder selection ignored");
            return;
        }
        self.last_error = None;

        let folder = match picker.pick().await {
            Ok(folder) => folder,
            Err(PickError::Cancelled) => {
                info!("folder selection cancelled");
                self.publish();
                return;
            }
            Err(PickError::Failed(description)) => {
                warn!(%description, "folder selection failed");
                self.last_error = Some(classify_pick_failure(&description));
                self.publish();
                return;
            }
        };

        info!(folder = %folder.label(), "folder granted");
        self.phase = Phase::Scanning;
        self.folder = Some(folder);
        self.publish();

        match self.scan().await {
            Ok(snapshot) => {
                self.snapshot = snapshot;
                self.enter_ready();
            }
            Err(e) => {
                warn!(error = %e, "initial scan failed");
                self.folder = None;
                self.phase = Phase::Selecting;
                self.last_error = Some(SelectionError::Unexpected(format!("{:#}", e)));
                self.publish();
            }
        }
    }

    async fn scan(&self) -> Result<ProjectSnapshot> {
        let folder = self
            .folder
            .as_deref()
            .ok_or_else(|| anyhow!("No project folder selected"))?;
        ProjectSnapshot::scan(folder).await
    }

    fn enter_ready(&mut self) {
        let count = self.snapshot.len();
        info!(scripts = count, "project scan complete");
        self.phase = Phase::Ready;
        self.rebuild_chat();
        self.messages.push(Sender::Assistant, greeting(count));
        self.publish();
    }

    /// Replace the snapshot with a fresh scan of the folder. On failure the
    /// previous snapshot is kept intact.
    pub async fn rescan(&mut self) -> Result<()> {
        let snapshot = self.scan().await?;
        debug!(scripts = snapshot.len(), "snapshot refreshed");
        self.snapshot = snapshot;
        if self.displayed.as_deref().is_some_and(|name| self.snapshot.get(name).is_none()) {
            self.displayed = None;
        }
        self.rebuild_chat();
        self.publish();
        Ok(())
    }

    /// The conversation is bound to the file contents it was built from, so
    /// it is recreated rather than updated whenever the snapshot changes.
    fn rebuild_chat(&mut self) {
        self.chat = Some(ChatSession::new(system_instruction(&self.snapshot)));
    }

    /// Route a user utterance to a file suggestion or a streamed reply
    pub async fn send_message(&mut self, text: &str) -> SendOutcome {
        let utterance = text.trim();
        if utterance.is_empty() || self.phase != Phase::Ready || self.is_busy() {
            debug!(phase = ?self.phase, busy = self.is_busy(), "submission ignored");
            return SendOutcome::Ignored;
        }

        self.messages.push(Sender::User, utterance);
        self.publish();

        match self.classifier.classify(utterance) {
            Intent::Suggest { kind, target_name } => {
                info!(kind = kind.as_str(), target = %target_name, "routing to suggestion builder");
                self.request_suggestion(utterance, kind, &target_name).await
            }
            Intent::Converse => {
                debug!("routing to conversation");
                self.stream_reply(utterance).await
            }
        }
    }

    pub(crate) fn set_busy(&mut self, reason: impl Into<String>) {
        self.busy = Some(reason.into());
        self.publish();
    }

    pub(crate) fn clear_busy(&mut self) {
        self.busy = None;
        self.publish();
    }

    pub(crate) fn raise_notice(&mut self, kind: NoticeKind, text: impl Into<String>) {
        // A newer notice replaces whatever is still showing
        self.notice = Some(Notice::new(kind, text));
        self.publish();
    }

    pub(crate) fn publish(&self) {
        self.observer.publish(self);
    }
}

fn greeting(count: usize) -> String {
    let noun = if count == 1 { "script" } else { "scripts" };
    format!(
        "Hello! I've scanned {} {} {} and I'm ready to help. How can I assist you?",
        count, SCRIPT_LANGUAGE, noun
    )
}
