use crate::driver::Command;
use crate::view::SessionView;
use ratatui::widgets::ListState;
use scriptwright_core::Decision;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Scripts,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Single-line text field with a character cursor
#[derive(Debug, Clone, Default)]
pub struct TextInput {
    text: String,
    cursor: usize,
}

impl TextInput {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.text.chars().count() {
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.text.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.text.chars().count();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }
}

/// Expand a leading `~` so typed paths behave like they do in a shell
fn expand_home(input: &str) -> PathBuf {
    match (input.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(input),
    }
}

pub struct App {
    pub should_quit: bool,
    pub focus: Focus,
    pub input_mode: InputMode,

    pub folder_input: TextInput,
    pub chat_input: TextInput,

    pub script_state: ListState,
    pub code_scroll: u16,
    pub chat_scroll: u16,
    /// Keep the chat pinned to its newest line while replies stream in
    pub follow_chat: bool,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    /// Provider and model shown in the chat title
    pub backend_label: String,
    pub view: SessionView,

    commands: mpsc::UnboundedSender<Command>,
}

impl App {
    pub fn new(view: SessionView, commands: mpsc::UnboundedSender<Command>, backend_label: String) -> Self {
        let mut app = Self {
            should_quit: false,
            focus: Focus::Chat,
            input_mode: InputMode::Normal,
            folder_input: TextInput::default(),
            chat_input: TextInput::default(),
            script_state: ListState::default(),
            code_scroll: 0,
            chat_scroll: 0,
            follow_chat: true,
            animation_frame: 0,
            backend_label,
            view: view.clone(),
            commands,
        };
        app.update_view(view);
        app
    }

    pub fn update_view(&mut self, view: SessionView) {
        let count = view.scripts.len();
        match self.script_state.selected() {
            _ if count == 0 => self.script_state.select(None),
            Some(i) if i >= count => self.script_state.select(Some(count - 1)),
            None => self.script_state.select(Some(0)),
            Some(_) => {}
        }
        self.view = view;
    }

    fn send(&mut self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("session driver stopped; quitting");
            self.should_quit = true;
        }
    }

    pub fn submit_folder(&mut self) {
        let typed = self.folder_input.as_str().trim().to_string();
        if typed.is_empty() {
            return;
        }
        self.folder_input.clear();
        self.send(Command::SelectFolder(Some(expand_home(&typed))));
    }

    pub fn cancel_folder(&mut self) {
        self.folder_input.clear();
        self.send(Command::SelectFolder(None));
    }

    /// Queue the chat input for the session. Refused while the session is
    /// busy; the typed text is kept so it can be sent afterwards.
    pub fn submit_chat(&mut self) -> bool {
        if self.view.is_busy() || self.chat_input.as_str().trim().is_empty() {
            return false;
        }
        let text = self.chat_input.take();
        self.input_mode = InputMode::Normal;
        self.follow_chat = true;
        self.send(Command::Send(text));
        true
    }

    /// Approve or decline the newest pending suggestion
    pub fn decide(&mut self, decision: Decision) {
        if self.view.is_busy() {
            return;
        }
        if let Some(message_id) = self.view.latest_pending().map(str::to_string) {
            self.send(Command::Act { message_id, decision });
        }
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Scripts => Focus::Chat,
            Focus::Chat => Focus::Scripts,
        };
    }

    pub fn script_nav_down(&mut self) {
        let count = self.view.scripts.len();
        if count > 0 {
            let i = self.script_state.selected().map_or(0, |i| (i + 1).min(count - 1));
            self.script_state.select(Some(i));
        }
    }

    pub fn script_nav_up(&mut self) {
        if let Some(i) = self.script_state.selected() {
            self.script_state.select(Some(i.saturating_sub(1)));
        }
    }

    pub fn display_selected(&mut self) {
        let Some(name) = self
            .script_state
            .selected()
            .and_then(|i| self.view.scripts.get(i))
            .cloned()
        else {
            return;
        };
        self.code_scroll = 0;
        self.send(Command::DisplayScript(name));
    }

    pub fn scroll_code(&mut self, delta: i32) {
        self.code_scroll = (self.code_scroll as i32 + delta).max(0) as u16;
    }

    pub fn scroll_chat_up(&mut self) {
        self.follow_chat = false;
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_chat_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.view.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptwright_core::{Message, Phase, Sender, Suggestion, SuggestionKind};

    fn ready_view() -> SessionView {
        SessionView {
            phase: Phase::Ready,
            folder_label: Some("/tmp/project".to_string()),
            error: None,
            scripts: vec!["Enemy.cs".to_string(), "Player.cs".to_string()],
            displayed: None,
            messages: Vec::new(),
            busy: None,
            notice: None,
        }
    }

    fn app(view: SessionView) -> (App, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (App::new(view, tx, "Ollama: test".to_string()), rx)
    }

    fn type_text(input: &mut TextInput, text: &str) {
        for c in text.chars() {
            input.insert(c);
        }
    }

    #[test]
    fn test_text_input_editing() {
        let mut input = TextInput::default();
        type_text(&mut input, "héllo");
        input.left();
        input.left();
        input.backspace();
        assert_eq!(input.as_str(), "hélo");
        input.home();
        input.delete();
        assert_eq!(input.as_str(), "élo");
        input.end();
        assert_eq!(input.cursor(), 3);
        assert_eq!(input.take(), "élo");
        assert_eq!(input.cursor(), 0);
    }

    #[test]
    fn test_submit_chat_refused_while_busy() {
        let mut view = ready_view();
        view.busy = Some("Thinking...".to_string());
        let (mut app, mut rx) = app(view);
        type_text(&mut app.chat_input, "create Door.cs");

        assert!(!app.submit_chat());
        assert_eq!(app.chat_input.as_str(), "create Door.cs");
        assert!(rx.try_recv().is_err());

        app.update_view(ready_view());
        assert!(app.submit_chat());
        assert_eq!(rx.try_recv().unwrap(), Command::Send("create Door.cs".to_string()));
        assert!(app.chat_input.as_str().is_empty());
    }

    #[test]
    fn test_decide_targets_latest_pending() {
        let mut view = ready_view();
        let pending = |id: &str| Message {
            id: id.to_string(),
            sender: Sender::Assistant,
            text: String::new(),
            suggestion: Some(Suggestion::pending(SuggestionKind::Edit, "Player.cs", "//", "x", None)),
        };
        view.messages = vec![pending("1-0"), pending("1-1")];
        let (mut app, mut rx) = app(view);

        app.decide(Decision::Declined);
        assert_eq!(
            rx.try_recv().unwrap(),
            Command::Act {
                message_id: "1-1".to_string(),
                decision: Decision::Declined
            }
        );
    }

    #[test]
    fn test_script_selection_clamps_to_snapshot() {
        let (mut app, mut rx) = app(ready_view());
        assert_eq!(app.script_state.selected(), Some(0));
        app.script_nav_down();
        app.script_nav_down();
        assert_eq!(app.script_state.selected(), Some(1));

        app.display_selected();
        assert_eq!(rx.try_recv().unwrap(), Command::DisplayScript("Player.cs".to_string()));

        let mut smaller = ready_view();
        smaller.scripts.truncate(1);
        app.update_view(smaller);
        assert_eq!(app.script_state.selected(), Some(0));
    }

    #[test]
    fn test_folder_prompt_commands() {
        let mut view = ready_view();
        view.phase = Phase::Selecting;
        let (mut app, mut rx) = app(view);

        app.submit_folder();
        assert!(rx.try_recv().is_err());

        type_text(&mut app.folder_input, " /tmp/game/Assets ");
        app.submit_folder();
        assert_eq!(
            rx.try_recv().unwrap(),
            Command::SelectFolder(Some(PathBuf::from("/tmp/game/Assets")))
        );

        app.cancel_folder();
        assert_eq!(rx.try_recv().unwrap(), Command::SelectFolder(None));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_home("~user/x"), PathBuf::from("~user/x"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/Assets"), home.join("Assets"));
        }
    }
}
