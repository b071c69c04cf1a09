pub mod app;
pub mod config;
pub mod handler;
pub mod openai;
pub mod pipeline;
pub mod policy;
pub mod state;
pub mod tui;
pub mod ui;

// Re-export main types for convenience
pub use config::Config;
pub use openai::{CompletionTransport, OpenAIClient};
pub use pipeline::{CompletionPipeline, Outcome, Reply};
pub use state::{Conversation, Message, Origin, RequestSlot};
