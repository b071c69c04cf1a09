//! Completion request pipeline
//!
//! Turns a conversation snapshot into one assistant message. Rate-limited
//! attempts are retried after a constant delay. Every other failure becomes a
//! fixed placeholder, so callers always get a message back.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::openai::{completion_text, CompletionTransport, OpenAIMessage, OpenAIRequest, TransportError};
use crate::policy::{
    apply_domain_filter, Filtered, ATTEMPTS_EXHAUSTED, MALFORMED_RESPONSE, REFUSAL,
    SYSTEM_PROMPT, TRANSPORT_ERROR,
};
use crate::state::{Message, Origin};

/// Why a single attempt did not yield a completion
#[derive(Debug, Error)]
enum AttemptError {
    #[error("rate limited")]
    RateLimited,
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("response had no completion text (status {0})")]
    Malformed(StatusCode),
}

/// Terminal state of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Completion passed the domain filter and is shown verbatim
    Answered(String),
    /// Completion was off-topic and replaced by the refusal
    Refused,
    Malformed,
    TransportFailed,
    /// Every attempt was rate limited
    Exhausted,
}

impl Outcome {
    pub fn text(&self) -> &str {
        match self {
            Outcome::Answered(text) => text.as_str(),
            Outcome::Refused => REFUSAL,
            Outcome::Malformed => MALFORMED_RESPONSE,
            Outcome::TransportFailed => TRANSPORT_ERROR,
            Outcome::Exhausted => ATTEMPTS_EXHAUSTED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub outcome: Outcome,
    pub attempts: u32,
}

impl Reply {
    pub fn into_message(self) -> Message {
        match self.outcome {
            Outcome::Answered(text) => Message::assistant(text),
            other => Message::assistant(other.text()),
        }
    }
}

/// Build the request payload: system prompt first, then the history in order.
pub fn build_request(model: &str, history: &[Message]) -> OpenAIRequest {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(OpenAIMessage::new("system", SYSTEM_PROMPT));
    messages.extend(history.iter().map(|message| {
        let role = match message.origin {
            Origin::Assistant => "assistant",
            Origin::User => "user",
        };
        OpenAIMessage::new(role, &message.text)
    }));

    OpenAIRequest {
        model: model.to_string(),
        messages,
    }
}

pub struct CompletionPipeline<T> {
    transport: T,
    model: String,
    max_attempts: u32,
    retry_delay: Duration,
}

impl<T: CompletionTransport> CompletionPipeline<T> {
    pub fn new(transport: T, config: &Config) -> Self {
        Self {
            transport,
            model: config.model.clone(),
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
        }
    }

    /// Produce the assistant message that answers `history`. Never fails.
    pub async fn produce_reply(&self, history: &[Message]) -> Message {
        self.run(history).await.into_message()
    }

    pub async fn run(&self, history: &[Message]) -> Reply {
        let request = build_request(&self.model, history);
        let mut attempts = 0;

        while attempts < self.max_attempts {
            if attempts > 0 {
                tokio::time::sleep(self.retry_delay).await;
            }
            attempts += 1;
            debug!(attempt = attempts, max = self.max_attempts, "sending completion request");

            let outcome = match self.attempt(&request).await {
                Ok(text) => match apply_domain_filter(text) {
                    Filtered::Kept(text) => Outcome::Answered(text),
                    Filtered::Refused => {
                        info!("completion was off-topic, substituting refusal");
                        Outcome::Refused
                    }
                },
                Err(AttemptError::RateLimited) => {
                    warn!(attempt = attempts, "rate limited by completion endpoint");
                    continue;
                }
                Err(err @ AttemptError::Transport(_)) => {
                    error!(error = %err, "completion request failed");
                    Outcome::TransportFailed
                }
                Err(err @ AttemptError::Malformed(_)) => {
                    warn!(error = %err, "could not read completion");
                    Outcome::Malformed
                }
            };

            return Reply { outcome, attempts };
        }

        error!(attempts, "giving up after repeated rate limiting");
        Reply {
            outcome: Outcome::Exhausted,
            attempts,
        }
    }

    async fn attempt(&self, request: &OpenAIRequest) -> Result<String, AttemptError> {
        let response = self.transport.send(request).await?;
        if response.status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::RateLimited);
        }

        // Any other status, error or not, is read as a completed response
        debug!(status = %response.status, "completion response received");
        completion_text(&response.body).ok_or(AttemptError::Malformed(response.status))
    }
}
