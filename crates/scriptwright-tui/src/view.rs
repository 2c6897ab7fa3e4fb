use scriptwright_core::session::SCANNING_MESSAGE;
use scriptwright_core::{Message, Notice, Observer, Phase, Session};
use std::time::Instant;
use tokio::sync::watch;

/// Owned copy of everything the screen draws, taken after each session change
#[derive(Debug, Clone)]
pub struct SessionView {
    pub phase: Phase,
    pub folder_label: Option<String>,
    pub error: Option<String>,
    pub scripts: Vec<String>,
    /// Name and content of the script in the code viewer
    pub displayed: Option<(String, String)>,
    pub messages: Vec<Message>,
    pub busy: Option<String>,
    pub notice: Option<Notice>,
}

impl SessionView {
    pub fn from_session(session: &Session) -> Self {
        let busy = match session.phase() {
            Phase::Scanning => Some(SCANNING_MESSAGE.to_string()),
            _ => session.busy_reason().map(str::to_string),
        };

        Self {
            phase: session.phase(),
            folder_label: session.folder_label(),
            error: session.last_error().map(|e| e.to_string()),
            scripts: session.snapshot().scripts().iter().map(|s| s.name.clone()).collect(),
            displayed: session
                .displayed_script()
                .map(|s| (s.name.clone(), s.content.clone())),
            messages: session.messages().as_slice().to_vec(),
            busy,
            notice: session.notice().cloned(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_some()
    }

    pub fn visible_notice(&self, now: Instant) -> Option<&Notice> {
        self.notice.as_ref().filter(|n| n.is_visible_at(now))
    }

    /// Id of the newest suggestion still awaiting approve/decline
    pub fn latest_pending(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.suggestion.as_ref().is_some_and(|s| s.is_pending()))
            .map(|m| m.id.as_str())
    }
}

/// Forwards every published session state to the render loop
pub struct WatchObserver {
    tx: watch::Sender<SessionView>,
}

impl WatchObserver {
    pub fn new(tx: watch::Sender<SessionView>) -> Self {
        Self { tx }
    }
}

impl Observer for WatchObserver {
    fn publish(&self, session: &Session) {
        // send_replace never fails, even after the receiver is gone
        self.tx.send_replace(SessionView::from_session(session));
    }
}
