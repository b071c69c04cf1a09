//! UI-agnostic conversation state
//!
//! The conversation is append-only and the request slot allows at most one
//! outstanding completion. Both are owned by whichever front end drives them
//! (the TUI or the one-shot `ask` command).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::GREETING;

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
    pub origin: Origin,
    /// Display-only timestamp label
    pub label: String,
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    User,
    Assistant,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, Origin::User)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(text, Origin::Assistant)
    }

    fn new(text: impl Into<String>, origin: Origin) -> Self {
        Self {
            text: text.into(),
            origin,
            label: chrono::Local::now().format("%H:%M").to_string(),
        }
    }

    /// The assistant's opening message
    pub fn greeting() -> Self {
        Self {
            text: GREETING.to_string(),
            origin: Origin::Assistant,
            label: "just now".to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("a reply is already pending")]
    AlreadyPending,
}

/// Ordered, append-only list of exchanged messages
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// Start a conversation seeded with the greeting
    pub fn new() -> Self {
        Self {
            messages: vec![Message::greeting()],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Read-only copy handed to the completion pipeline
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }
}

/// Proof that a request slot was claimed. Consumed by [`RequestSlot::finish`].
#[derive(Debug)]
#[must_use = "a pending request must be finished to release the slot"]
pub struct PendingRequest {
    _private: (),
}

/// Single-slot guard for the in-flight completion request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestSlot {
    #[default]
    Idle,
    Pending,
}

impl RequestSlot {
    pub fn is_pending(&self) -> bool {
        matches!(self, RequestSlot::Pending)
    }

    /// Claim the slot. Fails while another request is outstanding.
    pub fn begin(&mut self) -> Result<PendingRequest, StateError> {
        match self {
            RequestSlot::Pending => Err(StateError::AlreadyPending),
            RequestSlot::Idle => {
                *self = RequestSlot::Pending;
                Ok(PendingRequest { _private: () })
            }
        }
    }

    /// Append the reply and release the slot in one step
    pub fn finish(&mut self, _request: PendingRequest, conversation: &mut Conversation, reply: Message) {
        conversation.push(reply);
        *self = RequestSlot::Idle;
    }
}
