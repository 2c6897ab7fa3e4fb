use crate::app::{App, Focus, InputMode, TextInput};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};
use scriptwright_core::{
    Message, NoticeKind, Phase, Sender, Suggestion, SuggestionKind, SuggestionStatus, SCRIPT_LANGUAGE,
};
use std::time::Instant;

/// Convert **bold** and `code` markdown in one line to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        let closing: &str = match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                "**"
            }
            '`' => "`",
            _ => {
                current_text.push(c);
                continue;
            }
        };

        let mut inner = String::new();
        let mut found_close = false;
        while let Some(c) = chars.next() {
            if closing == "`" && c == '`' {
                found_close = true;
                break;
            }
            if closing == "**" && c == '*' && chars.peek() == Some(&'*') {
                chars.next();
                found_close = true;
                break;
            }
            inner.push(c);
        }

        if found_close && !inner.is_empty() {
            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }
            let style = if closing == "`" {
                Style::default().fg(Color::Green)
            } else {
                Style::default().add_modifier(Modifier::BOLD)
            };
            spans.push(Span::styled(inner, style));
        } else {
            // No closing marker, treat as literal
            current_text.push_str(closing);
            current_text.push_str(&inner);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }
    Line::from(spans)
}

/// Rows a set of lines takes once wrapped to `width` columns
fn wrapped_height(lines: &[Line], width: u16) -> u16 {
    let width = width.max(1) as usize;
    lines
        .iter()
        .map(|line| line.width().max(1).div_ceil(width) as u16)
        .sum()
}

/// One row of `inner`, clipped so small terminals never draw outside it
fn row(inner: Rect, offset: u16) -> Rect {
    Rect::new(inner.x, inner.y.saturating_add(offset), inner.width, 1).intersection(inner)
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.view.phase {
        Phase::Unsupported => render_unsupported(frame, body_area),
        Phase::Selecting | Phase::Scanning => render_folder_prompt(app, frame, body_area),
        Phase::Ready => render_main(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    if let Some(reason) = app.view.busy.clone() {
        render_busy_overlay(app, &reason, frame, body_area);
    }
    render_notice(app, frame, body_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let folder = app
        .view
        .folder_label
        .as_ref()
        .map(|label| format!(" [{}]", label))
        .unwrap_or_default();

    let title = Line::from(vec![
        Span::styled(" Scriptwright ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(folder, Style::default().fg(Color::White)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let keys: &[(&str, &str)] = match (app.view.phase, app.input_mode) {
        (Phase::Unsupported, _) => &[("q", "quit")],
        (Phase::Selecting, _) => &[("Enter", "open folder"), ("Esc", "cancel"), ("Ctrl-C", "quit")],
        (Phase::Scanning, _) => &[("Ctrl-C", "quit")],
        (Phase::Ready, InputMode::Editing) => &[("Enter", "send"), ("Esc", "stop editing")],
        (Phase::Ready, InputMode::Normal) => match app.focus {
            Focus::Scripts => &[
                ("j/k", "select"),
                ("Enter", "view"),
                ("^d/^u", "scroll code"),
                ("Tab", "chat"),
                ("q", "quit"),
            ],
            Focus::Chat => &[
                ("i", "type"),
                ("a", "approve"),
                ("d", "decline"),
                ("j/k", "scroll"),
                ("Tab", "scripts"),
                ("q", "quit"),
            ],
        },
    };

    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match (app.view.phase, app.input_mode) {
        (Phase::Ready, InputMode::Editing) => " INSERT ",
        (Phase::Ready, InputMode::Normal) => " NORMAL ",
        _ => " SETUP ",
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    for (key, label) in keys {
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(format!(" {} ", label), label_style));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_unsupported(frame: &mut Frame, area: Rect) {
    let popup = centered_rect(64, 8, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Folder access unavailable ");
    let text = Text::from(vec![
        Line::from("This terminal cannot be used to grant access to a project folder."),
        Line::default(),
        Line::from(Span::styled(
            "Run scriptwright from an interactive terminal to select your Unity project.",
            Style::default().fg(Color::DarkGray),
        )),
    ]);
    frame.render_widget(Paragraph::new(text).block(block).wrap(Wrap { trim: true }), popup);
}

fn render_input_line(input: &TextInput, frame: &mut Frame, area: Rect, show_cursor: bool, style: Style) {
    // Horizontal scrolling keeps the cursor visible
    let width = area.width as usize;
    let cursor = input.cursor();
    let offset = if width > 0 && cursor >= width { cursor - width + 1 } else { 0 };
    let visible: String = input.as_str().chars().skip(offset).take(width).collect();
    frame.render_widget(Paragraph::new(visible).style(style), area);

    if show_cursor {
        frame.set_cursor_position((area.x + (cursor - offset) as u16, area.y));
    }
}

fn render_folder_prompt(app: &App, frame: &mut Frame, area: Rect) {
    let error_height = if app.view.error.is_some() { 7 } else { 0 };
    let popup = centered_rect(72, 7 + error_height, area);
    let [prompt_area, error_area] =
        Layout::vertical([Constraint::Length(7), Constraint::Length(error_height)]).areas(popup);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Open Unity project ");
    let inner = block.inner(prompt_area);
    frame.render_widget(block, prompt_area);

    let instructions = Paragraph::new(format!(
        "Enter the path of the folder holding your {} scripts.",
        SCRIPT_LANGUAGE
    ))
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, row(inner, 0));

    let input_area = row(inner, 2);
    let scanning = app.view.phase == Phase::Scanning;
    render_input_line(
        &app.folder_input,
        frame,
        input_area,
        !scanning,
        Style::default().fg(Color::Cyan),
    );

    let hint = if scanning {
        "Scanning..."
    } else {
        "Only the files directly inside this folder are read."
    };
    frame.render_widget(
        Paragraph::new(hint).style(Style::default().fg(Color::DarkGray)),
        row(inner, 4),
    );

    if let Some(error) = &app.view.error {
        let error_block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red))
            .title(" Error ");
        let error = Paragraph::new(error.as_str())
            .style(Style::default().fg(Color::Red))
            .block(error_block)
            .wrap(Wrap { trim: true });
        frame.render_widget(error, error_area);
    }
}

fn render_main(app: &mut App, frame: &mut Frame, area: Rect) {
    let [scripts_area, code_area, chat_area] = Layout::horizontal([
        Constraint::Percentage(20),
        Constraint::Percentage(40),
        Constraint::Percentage(40),
    ])
    .areas(area);

    render_script_list(app, frame, scripts_area);
    render_code_viewer(app, frame, code_area);
    render_chat(app, frame, chat_area);
}

fn focus_color(focused: bool) -> Color {
    if focused {
        Color::Cyan
    } else {
        Color::DarkGray
    }
}

fn render_script_list(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(focus_color(app.focus == Focus::Scripts)))
        .title(format!(" Scripts ({}) ", app.view.scripts.len()));

    if app.view.scripts.is_empty() {
        let empty = Paragraph::new(Span::styled(
            format!("No {} scripts", SCRIPT_LANGUAGE),
            Style::default().fg(Color::DarkGray),
        ))
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let displayed = app.view.displayed.as_ref().map(|(name, _)| name.as_str());
    let items: Vec<ListItem> = app
        .view
        .scripts
        .iter()
        .map(|name| {
            let style = if Some(name.as_str()) == displayed {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            };
            ListItem::new(Span::styled(name.clone(), style))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::Blue).fg(Color::White).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut app.script_state);
}

fn render_code_viewer(app: &App, frame: &mut Frame, area: Rect) {
    let Some((name, content)) = &app.view.displayed else {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(" Code ");
        let hint = Paragraph::new(Span::styled(
            "Select a script and press Enter to view it.",
            Style::default().fg(Color::DarkGray),
        ))
        .block(block);
        frame.render_widget(hint, area);
        return;
    };

    let number_width = content.lines().count().max(1).to_string().len();
    let lines: Vec<Line> = content
        .lines()
        .enumerate()
        .map(|(i, line)| {
            Line::from(vec![
                Span::styled(
                    format!("{:>width$} ", i + 1, width = number_width),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(line.to_string()),
            ])
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" {} ", name));
    let code = Paragraph::new(lines).block(block).scroll((app.code_scroll, 0));
    frame.render_widget(code, area);
}

fn suggestion_lines(suggestion: &Suggestion) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let heading = match suggestion.kind {
        SuggestionKind::Create => format!("New file: {}", suggestion.target_name),
        SuggestionKind::Edit => format!("Proposed edit: {}", suggestion.target_name),
    };
    lines.push(Line::from(Span::styled(
        heading,
        Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
    )));
    lines.extend(suggestion.explanation.lines().map(parse_markdown_line));

    if let Some(changes) = suggestion.changes.as_ref().filter(|c| !c.is_empty()) {
        lines.push(Line::from(Span::styled("Changes:", Style::default().bold())));
        lines.extend(changes.iter().map(|change| Line::from(format!("  • {}", change))));
    }

    lines.push(Line::default());
    lines.extend(
        suggestion
            .code
            .lines()
            .map(|line| Line::from(Span::styled(format!("  {}", line), Style::default().fg(Color::Green)))),
    );
    lines.push(Line::default());

    let status = match suggestion.status() {
        SuggestionStatus::Pending => Span::styled(
            "[a] approve   [d] decline",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        SuggestionStatus::Approved => Span::styled("✓ Approved", Style::default().fg(Color::Green)),
        SuggestionStatus::Declined => Span::styled("✗ Declined", Style::default().fg(Color::Red)),
    };
    lines.push(Line::from(status));
    lines
}

fn message_lines(message: &Message) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    match message.sender {
        Sender::User => {
            lines.push(Line::from(Span::styled(
                "You:",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )));
            lines.extend(message.text.lines().map(|l| Line::from(l.to_string())));
        }
        Sender::Assistant => {
            lines.push(Line::from(Span::styled(
                "AI:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            lines.extend(message.text.lines().map(parse_markdown_line));
            if let Some(suggestion) = &message.suggestion {
                lines.extend(suggestion_lines(suggestion));
            }
        }
    }
    lines.push(Line::default());
    lines
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let [history_area, input_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(focus_color(app.focus == Focus::Chat)))
        .title(format!(" {} ", app.backend_label));

    let lines: Vec<Line> = app.view.messages.iter().flat_map(message_lines).collect();

    let inner_width = history_area.width.saturating_sub(2);
    let inner_height = history_area.height.saturating_sub(2);
    let max_scroll = wrapped_height(&lines, inner_width).saturating_sub(inner_height);
    if app.follow_chat || app.chat_scroll > max_scroll {
        app.chat_scroll = max_scroll;
    }

    let history = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(history, history_area);

    let editing = app.input_mode == InputMode::Editing;
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if editing { Color::Yellow } else { Color::DarkGray }))
        .title(" Ask (i to type) ");
    let inner = input_block.inner(input_area);
    frame.render_widget(input_block, input_area);
    render_input_line(&app.chat_input, frame, inner, editing, Style::default().fg(Color::Cyan));
}

fn render_busy_overlay(app: &App, reason: &str, frame: &mut Frame, area: Rect) {
    let dots = ".".repeat(app.animation_frame as usize + 1);
    let text = format!("{}{}", reason.trim_end_matches('.'), dots);
    let popup = centered_rect(text.chars().count() as u16 + 8, 3, area);

    frame.render_widget(Clear, popup);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    let busy = Paragraph::new(Span::styled(
        text,
        Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC),
    ))
    .centered()
    .block(block);
    frame.render_widget(busy, popup);
}

fn render_notice(app: &App, frame: &mut Frame, area: Rect) {
    let Some(notice) = app.view.visible_notice(Instant::now()) else {
        return;
    };
    let color = match notice.kind {
        NoticeKind::Success => Color::Green,
        NoticeKind::Failure => Color::Red,
    };

    let width = (notice.text.chars().count() as u16 + 4).min(area.width);
    let toast = Rect::new(area.x + area.width.saturating_sub(width + 1), area.y, width, 3).intersection(area);
    frame.render_widget(Clear, toast);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color));
    frame.render_widget(
        Paragraph::new(Span::styled(notice.text.clone(), Style::default().fg(color))).block(block),
        toast,
    );
}
