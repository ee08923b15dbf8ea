//! Base provider trait and common types for aiDroid
//!
//! This module defines the Provider trait that model API clients implement,
//! along with the chat request and model metadata types they exchange.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Message structure for a chat request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (system, user, assistant)
    pub role: String,
    /// Content of the message
    pub content: String,
}

impl Message {
    /// Creates a new system message
    ///
    /// # Examples
    ///
    /// ```
    /// use aidroid::providers::Message;
    ///
    /// let msg = Message::system("You write Rust");
    /// assert_eq!(msg.role, "system");
    /// ```
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Creates a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Creates a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Body of a chat completion request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub stream: bool,
}

impl ChatRequest {
    /// Builds a system + user request
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        sampling: &crate::config::GenerationConfig,
        stream: bool,
    ) -> Self {
        Self {
            model: model.into(),
            messages: vec![Message::system(system_prompt), Message::user(user_prompt)],
            max_tokens: sampling.max_tokens,
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            stream,
        }
    }
}

/// Model metadata reported by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Identifier to put in `ChatRequest::model`
    pub id: String,
    /// Display name
    pub name: String,
    /// Maximum context window in tokens, when reported
    pub context_length: Option<u64>,
}

/// Raw response body of a streamed completion
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Model API client
///
/// Implementations map network and HTTP failures to
/// [`AidroidError::Transport`](crate::error::AidroidError::Transport) and
/// unexpected response shapes to
/// [`AidroidError::Protocol`](crate::error::AidroidError::Protocol).
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short provider name for logs and metrics
    fn name(&self) -> &str;

    /// Issue a blocking completion and return the assistant text
    async fn complete(&self, api_key: &str, request: &ChatRequest) -> Result<String>;

    /// Issue a streamed completion and return the raw SSE body
    async fn stream(&self, api_key: &str, request: &ChatRequest) -> Result<ByteStream>;

    /// List available models
    ///
    /// The default implementation reports that listing is unsupported.
    async fn list_models(&self, _api_key: &str) -> Result<Vec<ModelInfo>> {
        Err(crate::error::AidroidError::Transport(format!(
            "Model listing is not supported by provider {}",
            self.name()
        ))
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatRequest::new(
            "openai/gpt-4o-mini",
            "be brief",
            "hello",
            &GenerationConfig::default(),
            true,
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "openai/gpt-4o-mini");
        assert_eq!(json["stream"], true);
        assert_eq!(json["max_tokens"], 4000);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "be brief");
        assert_eq!(json["messages"][1]["role"], "user");
        assert!(json.get("temperature").is_some());
        assert!(json.get("top_p").is_some());
    }

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::user("u").role, "user");
        assert_eq!(Message::assistant("a").role, "assistant");
        assert_eq!(Message::system("s").content, "s");
    }
}
