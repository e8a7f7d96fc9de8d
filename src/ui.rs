use coki_core::{AppMode, ImageSize, Role};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use crate::app::{App, InputMode};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            // Consume the second *
            chars.next();

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;

            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                if !current_text.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current_text)));
                }
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

/// Animated ellipsis: cycles through ".", "..", "..."
fn dots(app: &App) -> String {
    ".".repeat(app.animation_frame + 1)
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

    match app.mode {
        AppMode::Search => render_search_screen(app, frame, body_area),
        AppMode::Image => render_image_screen(app, frame, body_area),
        AppMode::Chat => render_chat_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    if app.show_api_key_input {
        render_api_key_input(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let mut spans = vec![Span::styled(" Coki ", Style::default().fg(Color::Cyan).bold())];

    for (i, mode) in AppMode::all().iter().enumerate() {
        let label = format!(" {} {} ", i + 1, mode.display_name());
        if *mode == app.mode {
            spans.push(Span::styled(label, Style::default().bg(Color::Cyan).fg(Color::Black).bold()));
        } else {
            spans.push(Span::styled(label, Style::default().fg(Color::White)));
        }
    }

    let key_label = match app.key_source {
        Some(source) => format!(" key: {} ", source.as_str()),
        None => " no key ".to_string(),
    };
    spans.push(Span::styled(key_label, Style::default().fg(Color::Black)));
    spans.push(Span::styled(
        format!("v{}", env!("CARGO_PKG_VERSION")),
        Style::default().fg(Color::DarkGray),
    ));

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.mode {
        AppMode::Search => " SEARCH ",
        AppMode::Image => " CREATE ",
        AppMode::Chat => " CHAT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hint = |key: &'static str, label: &'static str| {
        [Span::styled(key, key_style), Span::styled(label, label_style)]
    };

    let mut hints: Vec<Span> = match (app.mode, app.input_mode) {
        (_, InputMode::Editing) => [hint(" Enter ", " submit "), hint(" Esc ", " done ")]
            .concat(),
        (AppMode::Search, InputMode::Normal) => {
            let mut hints = [hint(" i ", " type "), hint(" j/k ", " nav ")].concat();
            if app.search.has_searched {
                hints.extend(hint(" y ", " copy link "));
                hints.extend(hint(" Esc ", " clear "));
            } else {
                hints.extend(hint(" Enter ", " run "));
                hints.extend(hint(" x ", " clear history "));
            }
            hints.extend(hint(" v ", " voice "));
            hints
        }
        (AppMode::Image, InputMode::Normal) => [
            hint(" i ", " prompt "),
            hint(" ←/→ ", " size "),
            hint(" g ", " generate "),
        ]
        .concat(),
        (AppMode::Chat, InputMode::Normal) => [
            hint(" i ", " type "),
            hint(" j/k ", " scroll "),
            hint(" G ", " bottom "),
        ]
        .concat(),
    };

    if app.input_mode == InputMode::Normal {
        hints.extend(hint(" Tab ", " mode "));
        hints.extend(hint(" K ", " key "));
        hints.extend(hint(" q ", " quit "));
    }

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    spans.extend(hints);

    if let Some(notice) = &app.notice {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(notice.clone(), Style::default().fg(Color::Yellow)));
    }

    let footer = Paragraph::new(Line::from(spans));
    frame.render_widget(footer, area);
}

/// Single-line input box that scrolls horizontally to keep the cursor visible
fn render_input(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    text: &str,
    cursor_pos: usize,
    editing: bool,
) {
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" {} ", title));

    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;

    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = text
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);

    frame.render_widget(input, area);

    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_search_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [input_area, results_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(0),
    ])
    .areas(area);

    let title = if app.search.is_loading {
        format!("Searching{}", dots(app))
    } else if app.dictation.is_some() {
        "Search (listening)".to_string()
    } else {
        "Search with Coki...".to_string()
    };
    render_input(
        frame,
        input_area,
        &title,
        &app.search.query,
        app.search.cursor,
        app.input_mode == InputMode::Editing,
    );

    if !app.search.has_searched {
        render_search_history(app, frame, results_area);
        return;
    }

    // Overview on the left, sources on the right
    let [summary_area, sources_area] = Layout::horizontal([
        Constraint::Percentage(60),
        Constraint::Percentage(40),
    ])
    .areas(results_area);

    let summary_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Coki Overview ");

    let summary_text = if app.search.is_loading && app.search.summary.is_empty() {
        Text::from(Span::styled(
            format!("Thinking{}", dots(app)),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ))
    } else {
        Text::from(
            app.search
                .summary
                .lines()
                .map(parse_markdown_line)
                .collect::<Vec<_>>(),
        )
    };

    let summary = Paragraph::new(summary_text)
        .block(summary_block)
        .wrap(Wrap { trim: true })
        .scroll((app.search.summary_scroll, 0));
    frame.render_widget(summary, summary_area);

    let sources_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" Sources ({}) ", app.search.results.len()));

    if app.search.results.is_empty() {
        let message = if app.search.is_loading { "" } else { "No sources returned." };
        let empty = Paragraph::new(message)
            .style(Style::default().fg(Color::DarkGray))
            .block(sources_block);
        frame.render_widget(empty, sources_area);
        return;
    }

    let items: Vec<ListItem> = app
        .search
        .results
        .iter()
        .map(|link| {
            ListItem::new(vec![
                Line::from(Span::styled(link.title.clone(), Style::default().fg(Color::Yellow).bold())),
                Line::from(Span::styled(link.url.clone(), Style::default().fg(Color::DarkGray))),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(sources_block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, sources_area, &mut app.search.results_state);
}

fn render_search_history(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Recent searches ");

    if app.history.is_empty() {
        let landing = Paragraph::new(vec![
            Line::default(),
            Line::from(vec![
                Span::raw("What can "),
                Span::styled("Coki", Style::default().fg(Color::Cyan).bold()),
                Span::raw(" find for you?"),
            ]),
            Line::from(Span::styled(
                "Press i to type a query.",
                Style::default().fg(Color::DarkGray),
            )),
        ])
        .centered()
        .block(block);
        frame.render_widget(landing, area);
        return;
    }

    let items: Vec<ListItem> = app
        .history
        .entries()
        .iter()
        .map(|query| ListItem::new(format!(" {} ", query)))
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.search.history_state);
}

fn render_image_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [controls_area, preview_area] = Layout::horizontal([
        Constraint::Percentage(50),
        Constraint::Percentage(50),
    ])
    .areas(area);

    let [prompt_area, size_area, status_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Min(0),
    ])
    .areas(controls_area);

    render_input(
        frame,
        prompt_area,
        "Prompt",
        &app.image.prompt,
        app.image.cursor,
        app.input_mode == InputMode::Editing,
    );

    // Size selector
    let mut size_spans = Vec::new();
    for size in ImageSize::all() {
        let label = format!(" {} ", size.as_str());
        if size == app.image.size {
            size_spans.push(Span::styled(label, Style::default().bg(Color::Magenta).fg(Color::White).bold()));
        } else {
            size_spans.push(Span::styled(label, Style::default().fg(Color::DarkGray)));
        }
        size_spans.push(Span::raw(" "));
    }
    let sizes = Paragraph::new(Line::from(size_spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(" Image Size "),
    );
    frame.render_widget(sizes, size_area);

    let mut status_lines = Vec::new();
    if app.image.is_loading {
        status_lines.push(Line::from(Span::styled(
            format!("Generating{}", dots(app)),
            Style::default().fg(Color::Magenta).add_modifier(Modifier::ITALIC),
        )));
    }
    if let Some(error) = &app.image.error {
        status_lines.push(Line::from(Span::styled(error.clone(), Style::default().fg(Color::Red))));
    }
    status_lines.push(Line::default());
    status_lines.push(Line::from(Span::styled(
        "Coki generation requires an API key from a paid Google Cloud project.",
        Style::default().fg(Color::DarkGray),
    )));
    let status = Paragraph::new(status_lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::DarkGray)));
    frame.render_widget(status, status_area);

    // Preview column: a terminal cannot show the image, so show where it went
    let preview_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Result ");

    let preview_text = match &app.image.saved_path {
        Some(path) => Text::from(vec![
            Line::from(Span::styled("Saved to", Style::default().fg(Color::Yellow).bold())),
            Line::default(),
            Line::from(path.display().to_string()),
        ]),
        None => Text::from(vec![
            Line::from(Span::styled(
                "Your Coki masterpiece awaits",
                Style::default().fg(Color::White),
            )),
            Line::from(Span::styled(
                "Select size and press g to generate",
                Style::default().fg(Color::DarkGray),
            )),
        ]),
    };

    let preview = Paragraph::new(preview_text)
        .centered()
        .wrap(Wrap { trim: true })
        .block(preview_block);
    frame.render_widget(preview, preview_area);
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);
    if app.follow_chat {
        app.scroll_chat_to_bottom();
    }

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" Chat: {} ", app.config.chat_model));

    let chat_text = if app.chat.transcript().is_empty() {
        Text::from(Span::styled(
            "Ask Coki anything...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for turn in app.chat.transcript() {
            match turn.role {
                Role::User => {
                    lines.push(Line::from(Span::styled(
                        "You:",
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    )));
                    for line in turn.text.lines() {
                        lines.push(Line::from(line.to_string()));
                    }
                }
                Role::Model => {
                    lines.push(Line::from(Span::styled(
                        "Coki:",
                        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                    )));
                    if turn.text.is_empty() {
                        lines.push(Line::from(Span::styled(
                            format!("Thinking{}", dots(app)),
                            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                        )));
                    }
                    for line in turn.text.lines() {
                        lines.push(parse_markdown_line(line));
                    }
                }
            }
            lines.push(Line::default());
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, chat_area);

    let title = if app.chat.is_awaiting() { "Ask (waiting for reply)" } else { "Ask" };
    render_input(
        frame,
        input_area,
        title,
        app.chat.input(),
        app.chat_cursor,
        app.input_mode == InputMode::Editing,
    );
}

fn render_api_key_input(app: &App, frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = 7;

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Enter Gemini API Key ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new("Paste your API key below. Press Enter to save, Esc to cancel.")
        .style(Style::default().fg(Color::DarkGray));

    let instructions_area = Rect::new(inner.x, inner.y, inner.width, 1);
    frame.render_widget(instructions, instructions_area);

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);

    let display_text = mask_key(&app.api_key_input);
    let input = Paragraph::new(display_text)
        .style(Style::default().fg(Color::Cyan));

    frame.render_widget(input, input_area);

    let cursor_x = app.api_key_input_cursor.min(input_area.width as usize) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));

    let char_count = format!("{} characters", app.api_key_input.chars().count());
    let status = Paragraph::new(char_count)
        .style(Style::default().fg(Color::DarkGray));

    let status_area = Rect::new(inner.x, inner.y + 4, inner.width, 1);
    frame.render_widget(status, status_area);
}

/// Mask the key with asterisks, showing the last 4 chars
fn mask_key(key: &str) -> String {
    let char_count = key.chars().count();
    if char_count <= 4 {
        return "*".repeat(char_count);
    }
    let masked_len = char_count - 4;
    let last_four: String = key.chars().skip(masked_len).collect();
    format!("{}...{}", "*".repeat(masked_len.min(20)), last_four)
}
