use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

impl OpenAIMessage {
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct OpenAIRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: Option<OpenAIResponseMessage>,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

/// Extract `choices[0].message.content` from a response body.
///
/// Returns `None` for invalid JSON or when any part of the path is missing
/// or null; error bodies such as `{"error": {...}}` land here too.
pub fn completion_text(body: &str) -> Option<String> {
    let response: OpenAIResponse = serde_json::from_str(body).ok()?;
    response.choices.into_iter().next()?.message?.content
}

/// Status and body of a response that made it back over the wire
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Sends a completion request and returns the raw response.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn send(&self, request: &OpenAIRequest) -> Result<TransportResponse, TransportError>;
}

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OpenAIClient {
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl CompletionTransport for OpenAIClient {
    async fn send(&self, request: &OpenAIRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self.client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(request);

        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_text_reads_first_choice() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "first"}},
                {"index": 1, "message": {"role": "assistant", "content": "second"}}
            ],
            "usage": {"total_tokens": 10}
        }"#;
        assert_eq!(completion_text(body).as_deref(), Some("first"));
    }

    #[test]
    fn test_completion_text_missing_choices() {
        assert_eq!(completion_text(r#"{"error": {"message": "bad key"}}"#), None);
        assert_eq!(completion_text(r#"{"choices": []}"#), None);
    }

    #[test]
    fn test_completion_text_missing_message_or_content() {
        assert_eq!(completion_text(r#"{"choices": [{"index": 0}]}"#), None);
        assert_eq!(completion_text(r#"{"choices": [{"message": {"content": null}}]}"#), None);
    }

    #[test]
    fn test_completion_text_invalid_json() {
        assert_eq!(completion_text("<html>Bad Gateway</html>"), None);
        assert_eq!(completion_text(""), None);
    }

    #[test]
    fn test_request_serializes_model_and_messages() {
        let request = OpenAIRequest {
            model: "gpt-3.5-turbo".to_string(),
            messages: vec![
                OpenAIMessage::new("system", "prompt"),
                OpenAIMessage::new("user", "hi"),
            ],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    {"role": "system", "content": "prompt"},
                    {"role": "user", "content": "hi"}
                ]
            })
        );
    }
}
