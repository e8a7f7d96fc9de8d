use anyhow::Result;
use coki_core::{AppMode, KeySelector};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use crate::app::{App, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Apply a cursor-editing key to a single-line buffer.
/// Returns false when the key is not an editing key.
fn edit_line(text: &mut String, cursor: &mut usize, key: KeyEvent) -> bool {
    let char_count = text.chars().count();
    match key.code {
        KeyCode::Backspace => {
            if *cursor > 0 {
                *cursor -= 1;
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            if *cursor < char_count {
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            *cursor = cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            *cursor = (*cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            *cursor = 0;
        }
        KeyCode::End => {
            *cursor = char_count;
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(text, *cursor);
            text.insert(byte_pos, c);
            *cursor += 1;
        }
        _ => return false,
    }
    true
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Chat(event) => app.apply_chat_event(event),
        AppEvent::SearchFinished { id, result } => app.finish_search(id, result),
        AppEvent::ImageFinished { id, result } => app.finish_image(id, result),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    app.notice = None;

    if app.show_api_key_input {
        handle_api_key_input(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_api_key_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.cancel_api_key_input(),
        KeyCode::Enter => app.save_api_key(),
        _ => {
            edit_line(&mut app.api_key_input, &mut app.api_key_input_cursor, key);
        }
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => {
            app.should_quit = true;
            return;
        }
        KeyCode::Tab => {
            app.set_mode(app.mode.next());
            return;
        }
        KeyCode::Char('1') => {
            app.set_mode(AppMode::Search);
            return;
        }
        KeyCode::Char('2') => {
            app.set_mode(AppMode::Image);
            return;
        }
        KeyCode::Char('3') => {
            app.set_mode(AppMode::Chat);
            return;
        }
        KeyCode::Char('K') => {
            app.open_select_key();
            return;
        }
        KeyCode::Char('i') | KeyCode::Char('/') => {
            app.input_mode = InputMode::Editing;
            return;
        }
        _ => {}
    }

    match app.mode {
        AppMode::Search => handle_search_normal(app, key),
        AppMode::Image => handle_image_normal(app, key),
        AppMode::Chat => handle_chat_normal(app, key),
    }
}

fn handle_search_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.search_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.search_nav_up(),
        KeyCode::Enter => {
            if app.search.has_searched {
                app.input_mode = InputMode::Editing;
            } else {
                app.run_history_entry();
            }
        }
        KeyCode::Esc => app.clear_search(),
        KeyCode::Char('x') if !app.search.has_searched => app.clear_history(),
        KeyCode::Char('y') if app.search.has_searched => copy_selected_link(app, copy_to_clipboard),
        KeyCode::Char('v') => app.toggle_voice_input(),
        KeyCode::PageDown => {
            app.search.summary_scroll = app.search.summary_scroll.saturating_add(5);
        }
        KeyCode::PageUp => {
            app.search.summary_scroll = app.search.summary_scroll.saturating_sub(5);
        }
        _ => {}
    }
}

fn copy_selected_link(app: &mut App, copy: impl FnOnce(&str) -> bool) {
    let Some(url) = app.selected_result().map(|link| link.url.clone()) else {
        return;
    };
    app.notice = Some(if copy(&url) {
        format!("Copied {url}")
    } else {
        format!("Could not copy {url}")
    });
}

fn handle_image_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Right | KeyCode::Char('s') | KeyCode::Char('l') => app.cycle_image_size(true),
        KeyCode::Left | KeyCode::Char('h') => app.cycle_image_size(false),
        KeyCode::Char('g') => app.generate_image(),
        KeyCode::Enter => app.input_mode = InputMode::Editing,
        _ => {}
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.scroll_chat_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_chat_up(1),
        KeyCode::PageDown | KeyCode::Char('d') => {
            let half_page = (app.chat_height / 2).max(1);
            app.scroll_chat_down(half_page);
        }
        KeyCode::PageUp | KeyCode::Char('u') => {
            let half_page = (app.chat_height / 2).max(1);
            app.scroll_chat_up(half_page);
        }
        KeyCode::Char('G') | KeyCode::End => app.scroll_chat_to_bottom(),
        KeyCode::Enter => app.input_mode = InputMode::Editing,
        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Esc {
        app.input_mode = InputMode::Normal;
        return;
    }

    if key.code == KeyCode::Enter {
        match app.mode {
            AppMode::Search => app.perform_search(),
            AppMode::Image => app.generate_image(),
            AppMode::Chat => app.submit_chat(),
        }
        app.input_mode = InputMode::Normal;
        return;
    }

    match app.mode {
        AppMode::Search => {
            edit_line(&mut app.search.query, &mut app.search.cursor, key);
        }
        AppMode::Image => {
            edit_line(&mut app.image.prompt, &mut app.image.cursor, key);
        }
        AppMode::Chat => {
            edit_line(app.chat.input_mut(), &mut app.chat_cursor, key);
        }
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match (mouse.kind, app.mode) {
        (MouseEventKind::ScrollDown, AppMode::Chat) => app.scroll_chat_down(3),
        (MouseEventKind::ScrollUp, AppMode::Chat) => app.scroll_chat_up(3),
        (MouseEventKind::ScrollDown, AppMode::Search) => app.search_nav_down(),
        (MouseEventKind::ScrollUp, AppMode::Search) => app.search_nav_up(),
        _ => {}
    }
}

/// Pipe text into the first clipboard tool that runs
fn copy_to_clipboard(text: &str) -> bool {
    use std::io::Write;
    use std::process::{Command, Stdio};

    const TOOLS: &[(&str, &[&str])] = &[
        ("pbcopy", &[]),
        ("wl-copy", &[]),
        ("xclip", &["-selection", "clipboard"]),
    ];

    for (program, args) in TOOLS {
        let Ok(mut child) = Command::new(program)
            .args(*args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        else {
            continue;
        };
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(text.as_bytes());
        }
        if child.wait().map(|status| status.success()).unwrap_or(false) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use coki_core::{Config, SearchHistory, SearchLink};
    use crossterm::event::KeyEventKind;
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            handle_key(app, key(KeyCode::Char(c)));
        }
    }

    fn test_app() -> App {
        let (tx, _rx) = unbounded_channel();
        App::new(Config::new(), SearchHistory::new(), tx, None)
    }

    #[test]
    fn test_edit_line_is_utf8_safe() {
        let mut text = String::from("héllo");
        let mut cursor = 2;
        assert!(edit_line(&mut text, &mut cursor, key(KeyCode::Backspace)));
        assert_eq!(text, "hllo");
        assert_eq!(cursor, 1);

        edit_line(&mut text, &mut cursor, key(KeyCode::Char('ë')));
        assert_eq!(text, "hëllo");
        edit_line(&mut text, &mut cursor, key(KeyCode::End));
        assert_eq!(cursor, 5);
        assert!(!edit_line(&mut text, &mut cursor, key(KeyCode::Tab)));
    }

    #[test]
    fn test_mode_switching() {
        let mut app = test_app();
        assert_eq!(app.mode, AppMode::Search);

        handle_key(&mut app, key(KeyCode::Tab));
        assert_eq!(app.mode, AppMode::Image);
        handle_key(&mut app, key(KeyCode::Char('3')));
        assert_eq!(app.mode, AppMode::Chat);
        handle_key(&mut app, key(KeyCode::Char('1')));
        assert_eq!(app.mode, AppMode::Search);
    }

    #[test]
    fn test_typing_goes_to_current_mode() {
        let mut app = test_app();
        handle_key(&mut app, key(KeyCode::Char('3')));
        handle_key(&mut app, key(KeyCode::Char('i')));
        assert_eq!(app.input_mode, InputMode::Editing);

        // Mode keys are plain text while editing
        type_text(&mut app, "q1 ok");
        assert_eq!(app.chat.input(), "q1 ok");
        assert_eq!(app.mode, AppMode::Chat);
        assert!(!app.should_quit);

        handle_key(&mut app, key(KeyCode::Esc));
        assert_eq!(app.input_mode, InputMode::Normal);
    }

    #[test]
    fn test_image_size_keys() {
        let mut app = test_app();
        app.set_mode(AppMode::Image);

        handle_key(&mut app, key(KeyCode::Right));
        assert_eq!(app.image.size.as_str(), "2K");
        handle_key(&mut app, key(KeyCode::Char('s')));
        assert_eq!(app.image.size.as_str(), "4K");
        handle_key(&mut app, key(KeyCode::Left));
        assert_eq!(app.image.size.as_str(), "2K");
    }

    #[test]
    fn test_api_key_popup_captures_keys() {
        let mut app = test_app();
        handle_key(&mut app, key(KeyCode::Char('K')));
        assert!(app.show_api_key_input);

        type_text(&mut app, "q2");
        assert_eq!(app.api_key_input, "q2");
        assert!(!app.should_quit);

        handle_key(&mut app, key(KeyCode::Esc));
        assert!(!app.show_api_key_input);
        assert!(app.api_key_input.is_empty());
    }

    #[test]
    fn test_ctrl_c_quits_from_anywhere() {
        let mut app = test_app();
        app.input_mode = InputMode::Editing;
        let mut ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        ctrl_c.kind = KeyEventKind::Press;

        handle_key(&mut app, ctrl_c);
        assert!(app.should_quit);
    }

    #[test]
    fn test_copy_selected_link() {
        let mut app = test_app();
        let mut copied = None;
        copy_selected_link(&mut app, |url| {
            copied = Some(url.to_string());
            true
        });
        assert!(copied.is_none());
        assert!(app.notice.is_none());

        app.search.has_searched = true;
        app.search.results = vec![
            SearchLink::new("Rust", "https://rust-lang.org"),
            SearchLink::new("Docs", "https://docs.rs"),
        ];
        app.search.results_state.select(Some(0));
        handle_key(&mut app, key(KeyCode::Char('j')));

        copy_selected_link(&mut app, |url| {
            copied = Some(url.to_string());
            true
        });
        assert_eq!(copied.as_deref(), Some("https://docs.rs"));
        assert_eq!(app.notice.as_deref(), Some("Copied https://docs.rs"));

        copy_selected_link(&mut app, |_| false);
        assert_eq!(app.notice.as_deref(), Some("Could not copy https://docs.rs"));
    }
}
