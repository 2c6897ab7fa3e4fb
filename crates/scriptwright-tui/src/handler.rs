use crate::app::{App, Focus, InputMode, TextInput};
use crate::tui::AppEvent;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use scriptwright_core::{Decision, Phase};

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.view.phase {
        Phase::Unsupported => {
            if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                app.should_quit = true;
            }
        }
        Phase::Selecting => handle_folder_prompt(app, key),
        // Nothing to interact with until the scan finishes
        Phase::Scanning => {}
        Phase::Ready => match app.input_mode {
            InputMode::Normal => handle_ready_normal(app, key),
            InputMode::Editing => handle_chat_editing(app, key),
        },
    }
}

/// Cursor movement and character entry shared by every text field
fn edit_text(input: &mut TextInput, key: KeyEvent) {
    match key.code {
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => input.left(),
        KeyCode::Right => input.right(),
        KeyCode::Home => input.home(),
        KeyCode::End => input.end(),
        KeyCode::Char(c) => input.insert(c),
        _ => {}
    }
}

fn handle_folder_prompt(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => app.submit_folder(),
        KeyCode::Esc => app.cancel_folder(),
        _ => edit_text(&mut app.folder_input, key),
    }
}

fn handle_ready_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Tab => app.toggle_focus(),
        KeyCode::Char('i') => {
            app.focus = Focus::Chat;
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Char('a') => app.decide(Decision::Approved),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => app.scroll_code(10),
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => app.scroll_code(-10),
        KeyCode::Char('d') => app.decide(Decision::Declined),
        KeyCode::Char('j') | KeyCode::Down => match app.focus {
            Focus::Scripts => app.script_nav_down(),
            Focus::Chat => app.scroll_chat_down(),
        },
        KeyCode::Char('k') | KeyCode::Up => match app.focus {
            Focus::Scripts => app.script_nav_up(),
            Focus::Chat => app.scroll_chat_up(),
        },
        KeyCode::Char('G') => app.follow_chat = true,
        KeyCode::Enter if app.focus == Focus::Scripts => app.display_selected(),
        _ => {}
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => {
            app.submit_chat();
        }
        _ => edit_text(&mut app.chat_input, key),
    }
}
