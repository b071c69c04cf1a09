use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use tracing::debug;

use crate::app::App;
use crate::openai::CompletionTransport;
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event<T: CompletionTransport + 'static>(app: &mut App<T>, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {
            if app.follow_bottom {
                app.scroll_to_bottom();
            }
        }
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Reply(message) => app.receive_reply(message),
    }
}

fn handle_key<T: CompletionTransport + 'static>(app: &mut App<T>, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match key.code {
        KeyCode::Esc => app.should_quit = true,

        KeyCode::Enter => {
            if let Err(e) = app.submit() {
                // Input stays in the box until the current reply lands
                debug!(error = %e, "submit ignored");
            }
        }

        // Chat scrolling
        KeyCode::Up => app.scroll_up(1),
        KeyCode::Down => app.scroll_down(1),
        KeyCode::PageUp => app.scroll_up(app.chat_height.max(2) / 2),
        KeyCode::PageDown => app.scroll_down(app.chat_height.max(2) / 2),

        // Input editing
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
}

fn handle_mouse<T: CompletionTransport + 'static>(app: &mut App<T>, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollUp => app.scroll_up(3),
        MouseEventKind::ScrollDown => app.scroll_down(3),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pipeline::tests::{ok_body, Scripted, ScriptedTransport};
    use crate::pipeline::CompletionPipeline;
    use crate::state::Origin;
    use tokio::sync::mpsc;

    fn app(script: Vec<Scripted>) -> (App<ScriptedTransport>, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pipeline = CompletionPipeline::new(ScriptedTransport::new(script), &Config::new());
        (App::new(pipeline, "gpt-3.5-turbo", tx), rx)
    }

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text<T: CompletionTransport + 'static>(app: &mut App<T>, text: &str) {
        for c in text.chars() {
            handle_event(app, key(KeyCode::Char(c)));
        }
    }

    #[test]
    fn test_char_to_byte_index_multibyte() {
        let s = "नमस्ते a";
        assert_eq!(char_to_byte_index(s, 0), 0);
        assert_eq!(char_to_byte_index(s, 1), "न".len());
        assert_eq!(char_to_byte_index(s, 100), s.len());
    }

    #[tokio::test]
    async fn test_editing_keys() {
        let (mut app, _rx) = app(vec![]);
        type_text(&mut app, "artcle");
        handle_event(&mut app, key(KeyCode::Left));
        handle_event(&mut app, key(KeyCode::Left));
        handle_event(&mut app, key(KeyCode::Left));
        type_text(&mut app, "i");
        assert_eq!(app.input, "article");

        handle_event(&mut app, key(KeyCode::Home));
        handle_event(&mut app, key(KeyCode::Delete));
        assert_eq!(app.input, "rticle");

        handle_event(&mut app, key(KeyCode::End));
        handle_event(&mut app, key(KeyCode::Backspace));
        assert_eq!(app.input, "rticl");
        assert_eq!(app.cursor, 5);
    }

    #[tokio::test]
    async fn test_enter_submits_and_reply_event_completes() {
        let text = "The Constitution of India came into force in 1950.";
        let (mut app, mut rx) = app(vec![Scripted::Status(200, ok_body(text))]);
        type_text(&mut app, "When did the constitution start?");
        handle_event(&mut app, key(KeyCode::Enter));
        assert!(app.is_typing());

        // Enter again while pending does nothing to the store
        type_text(&mut app, "again");
        handle_event(&mut app, key(KeyCode::Enter));
        assert_eq!(app.conversation.len(), 2);
        assert_eq!(app.input, "again");

        let event = rx.recv().await.unwrap();
        handle_event(&mut app, event);
        assert!(!app.is_typing());
        assert_eq!(app.conversation.len(), 3);
        assert_eq!(app.last_origin(), Some(Origin::Assistant));
        assert_eq!(app.conversation.messages()[2].text, text);
    }

    #[tokio::test]
    async fn test_quit_keys() {
        let (mut app, _rx) = app(vec![]);
        handle_event(&mut app, AppEvent::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)));
        assert!(app.should_quit);

        let (mut app, _rx) = self::app(vec![]);
        handle_event(&mut app, key(KeyCode::Esc));
        assert!(app.should_quit);
    }
}
