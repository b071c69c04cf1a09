use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::openai::CompletionTransport;
use crate::pipeline::CompletionPipeline;
use crate::state::{Conversation, Message, Origin, PendingRequest, RequestSlot, StateError};
use crate::tui::AppEvent;

pub struct App<T> {
    pub should_quit: bool,

    // Conversation state
    pub conversation: Conversation,
    pub slot: RequestSlot,
    pending: Option<PendingRequest>,

    // Input state (cursor is a char index)
    pub input: String,
    pub cursor: usize,

    // Chat pane state
    pub scroll: u16,
    pub chat_height: u16, // Inner height of chat area for scroll calculations
    pub chat_width: u16,  // Inner width of chat area for wrap calculations
    pub follow_bottom: bool,

    pub animation_frame: u8, // 0-2 for ellipsis animation
    pub model: String,

    pipeline: Arc<CompletionPipeline<T>>,
    events: UnboundedSender<AppEvent>,
}

impl<T> App<T> {
    pub fn new(pipeline: CompletionPipeline<T>, model: &str, events: UnboundedSender<AppEvent>) -> Self {
        Self {
            should_quit: false,
            conversation: Conversation::new(),
            slot: RequestSlot::Idle,
            pending: None,
            input: String::new(),
            cursor: 0,
            scroll: 0,
            chat_height: 0,
            chat_width: 0,
            follow_bottom: true,
            animation_frame: 0,
            model: model.to_string(),
            pipeline: Arc::new(pipeline),
            events,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.slot.is_pending()
    }

    /// Append the pipeline's reply and release the request slot
    pub fn receive_reply(&mut self, reply: Message) {
        match self.pending.take() {
            Some(request) => {
                self.slot.finish(request, &mut self.conversation, reply);
                self.animation_frame = 0;
                if self.follow_bottom {
                    self.scroll_to_bottom();
                }
            }
            None => debug!("ignoring reply with no pending request"),
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_typing() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_sub(lines);
        self.follow_bottom = false;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.max_scroll();
        self.scroll = self.scroll.saturating_add(lines).min(max);
        self.follow_bottom = self.scroll >= max;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = self.max_scroll();
    }

    fn max_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.total_chat_lines().saturating_sub(visible_height)
    }

    /// Approximate wrapped line count of the chat pane
    pub fn total_chat_lines(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 { self.chat_width as usize } else { 50 };

        let mut total_lines: usize = 0;
        for msg in self.conversation.messages() {
            total_lines += 1; // Speaker line
            for line in msg.text.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                total_lines += if char_count == 0 { 1 } else { (char_count - 1) / wrap_width + 1 };
            }
            total_lines += 1; // Blank line after message
        }

        if self.is_typing() {
            total_lines += 2; // Speaker line + typing indicator
        }

        // Paragraph scroll offsets are u16
        u16::try_from(total_lines).unwrap_or(u16::MAX)
    }

    pub fn last_origin(&self) -> Option<Origin> {
        self.conversation.messages().last().map(|m| m.origin)
    }
}

impl<T: CompletionTransport + 'static> App<T> {
    /// Send the current input as a user message and start the completion.
    ///
    /// Empty input is ignored. While a reply is pending the input is kept
    /// and `AlreadyPending` is returned.
    pub fn submit(&mut self) -> Result<(), StateError> {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return Ok(());
        }

        let request = self.slot.begin()?;
        self.pending = Some(request);

        self.conversation.push(Message::user(text));
        self.input.clear();
        self.cursor = 0;
        self.follow_bottom = true;
        self.scroll_to_bottom();

        let history = self.conversation.snapshot();
        let pipeline = Arc::clone(&self.pipeline);
        let events = self.events.clone();
        info!(messages = history.len(), "submitting question");

        tokio::spawn(async move {
            let reply = pipeline.produce_reply(&history).await;
            if events.send(AppEvent::Reply(reply)).is_err() {
                debug!("event loop closed before reply arrived");
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pipeline::tests::{ok_body, Scripted, ScriptedTransport};
    use crate::policy::{GREETING, REFUSAL};
    use tokio::sync::mpsc;

    fn app(script: Vec<Scripted>) -> (App<ScriptedTransport>, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pipeline = CompletionPipeline::new(ScriptedTransport::new(script), &Config::new());
        (App::new(pipeline, "gpt-3.5-turbo", tx), rx)
    }

    async fn next_reply(rx: &mut mpsc::UnboundedReceiver<AppEvent>) -> Message {
        match rx.recv().await {
            Some(AppEvent::Reply(message)) => message,
            other => panic!("expected reply event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_input_is_ignored() {
        let (mut app, _rx) = app(vec![]);
        app.input = "   ".to_string();
        assert!(app.submit().is_ok());
        assert!(!app.is_typing());
        assert_eq!(app.conversation.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_then_reply_round() {
        let text = "Under Indian law, a contract needs free consent.";
        let (mut app, mut rx) = app(vec![Scripted::Status(200, ok_body(text))]);
        app.input = "What makes a contract valid?".to_string();
        app.cursor = app.input.chars().count();

        app.submit().unwrap();
        assert!(app.is_typing());
        assert!(app.input.is_empty());
        assert_eq!(app.cursor, 0);
        assert_eq!(app.conversation.len(), 2);
        assert_eq!(app.last_origin(), Some(Origin::User));

        let reply = next_reply(&mut rx).await;
        app.receive_reply(reply);

        assert!(!app.is_typing());
        assert_eq!(app.conversation.len(), 3);
        let texts: Vec<&str> = app.conversation.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec![GREETING, "What makes a contract valid?", text]);
    }

    #[tokio::test]
    async fn test_second_submit_while_pending_is_refused() {
        let (mut app, mut rx) = app(vec![Scripted::Status(200, ok_body("Off topic"))]);
        app.input = "first".to_string();
        app.submit().unwrap();

        app.input = "second".to_string();
        assert_eq!(app.submit().unwrap_err(), StateError::AlreadyPending);
        assert_eq!(app.input, "second");
        assert_eq!(app.conversation.len(), 2);

        app.receive_reply(next_reply(&mut rx).await);
        assert_eq!(app.conversation.len(), 3);
        assert_eq!(app.conversation.messages()[2].text, REFUSAL);
    }

    #[tokio::test]
    async fn test_stray_reply_is_not_appended() {
        let (mut app, _rx) = app(vec![]);
        app.receive_reply(Message::assistant("unexpected"));
        assert_eq!(app.conversation.len(), 1);
        assert!(!app.is_typing());
    }

    #[tokio::test]
    async fn test_animation_only_ticks_while_typing() {
        let (mut app, _rx) = app(vec![Scripted::Status(200, ok_body("Indian law"))]);
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);

        app.input = "hi".to_string();
        app.submit().unwrap();
        app.tick_animation();
        app.tick_animation();
        assert_eq!(app.animation_frame, 2);
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);
    }

    #[tokio::test]
    async fn test_total_chat_lines_wraps_long_text() {
        let (mut app, _rx) = app(vec![]);
        app.chat_width = 10;
        // Greeting: 1 speaker + 9 wrapped (85 chars) + 1 blank
        assert_eq!(app.total_chat_lines(), 11);

        app.conversation.push(Message::user("0123456789"));
        assert_eq!(app.total_chat_lines(), 14);
    }

    #[tokio::test]
    async fn test_scrolling_clamps_and_tracks_bottom() {
        let (mut app, _rx) = app(vec![]);
        app.chat_width = 10;
        app.chat_height = 5;
        app.scroll_to_bottom();
        assert_eq!(app.scroll, 6);

        app.scroll_up(10);
        assert_eq!(app.scroll, 0);
        assert!(!app.follow_bottom);

        app.scroll_down(100);
        assert_eq!(app.scroll, 6);
        assert!(app.follow_bottom);
    }

    #[tokio::test]
    async fn test_long_session_line_count_saturates() {
        let (mut app, _rx) = app(vec![]);
        app.chat_width = 20;
        app.chat_height = 10;
        let long = "Indian law ".repeat(140);
        for _ in 0..1000 {
            app.conversation.push(Message::assistant(long.clone()));
        }

        assert_eq!(app.total_chat_lines(), u16::MAX);
        app.scroll_to_bottom();
        assert_eq!(app.scroll, u16::MAX - 10);

        app.scroll_down(u16::MAX);
        assert_eq!(app.scroll, u16::MAX - 10);
        assert!(app.follow_bottom);
    }
}
