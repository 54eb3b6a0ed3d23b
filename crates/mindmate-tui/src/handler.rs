use std::future::Future;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use mindmate_core::{ChatClient, ChatMode};

use crate::app::{App, InputMode};
use crate::tui::AppEvent;

pub fn handle_event(app: &mut App, client: &ChatClient, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, client, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::View(update) => app.apply(update),
    }
}

/// Run a client action in the background. Actions are never awaited by the
/// event loop, so several can be in flight at once.
fn spawn_action<F, Fut>(client: &ChatClient, action: F)
where
    F: FnOnce(ChatClient) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(action(client.clone()));
}

fn select_mode(client: &ChatClient, mode: ChatMode) {
    spawn_action(client, move |c| async move { c.select_mode(mode).await });
}

fn toggle_recording(client: &ChatClient) {
    spawn_action(client, |c| async move { c.toggle_recording().await });
}

fn listen(app: &App, client: &ChatClient) {
    if let Some(text) = app.listen_text() {
        spawn_action(client, move |c| async move { c.speak_text(&text).await });
    }
}

fn handle_key(app: &mut App, client: &ChatClient, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match key.code {
        KeyCode::F(1) => return select_mode(client, ChatMode::MentalHealth),
        KeyCode::F(2) => return select_mode(client, ChatMode::StudyBuddy),
        _ => {}
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, client, key),
        InputMode::Editing => handle_editing_mode(app, client, key),
    }
}

fn handle_normal_mode(app: &mut App, client: &ChatClient, key: KeyEvent) {
    match key.code {
        // Quit
        KeyCode::Char('q') => app.should_quit = true,

        // Back to typing
        KeyCode::Char('i') | KeyCode::Char('a') | KeyCode::Esc => {
            app.input_mode = InputMode::Editing;
            app.selected = None;
        }

        // Message selection
        KeyCode::Char('j') | KeyCode::Down => app.select_next_speakable(),
        KeyCode::Char('k') | KeyCode::Up => app.select_prev_speakable(),

        // Listen to the selected reply
        KeyCode::Enter | KeyCode::Char('l') => listen(app, client),

        // Half-page scroll
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_down();
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_up();
        }
        KeyCode::PageDown => app.scroll_half_page_down(),
        KeyCode::PageUp => app.scroll_half_page_up(),
        KeyCode::Char('g') => app.scroll = 0,
        KeyCode::Char('G') => app.scroll_to_bottom(),

        // Voice input
        KeyCode::Char('r') => toggle_recording(client),

        // Mode selectors
        KeyCode::Char('1') => select_mode(client, ChatMode::MentalHealth),
        KeyCode::Char('2') => select_mode(client, ChatMode::StudyBuddy),

        // Start over in the current mode
        KeyCode::Char('R') => {
            app.selected = None;
            spawn_action(client, |c| async move { c.refresh().await });
        }

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, client: &ChatClient, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            toggle_recording(client);
        }
        KeyCode::Enter => {
            let text = app.take_input();
            spawn_action(client, move |c| async move { c.send_message(&text).await });
        }
        KeyCode::Backspace => app.backspace(),
        KeyCode::Delete => app.delete(),
        KeyCode::Left => app.cursor_left(),
        KeyCode::Right => app.cursor_right(),
        KeyCode::Home => app.cursor_home(),
        KeyCode::End => app.cursor_end(),
        KeyCode::PageDown => app.scroll_half_page_down(),
        KeyCode::PageUp => app.scroll_half_page_up(),
        KeyCode::Char(c) => app.insert_char(c),
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}
