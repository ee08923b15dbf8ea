//! OpenRouter provider implementation for aiDroid
//!
//! Talks to the OpenAI-compatible `chat/completions` endpoint, either as a
//! single blocking call or as an SSE stream, and lists models from
//! `/models`.

use crate::config::OpenRouterConfig;
use crate::error::{AidroidError, Result};
use crate::providers::{ByteStream, ChatRequest, ModelInfo, Provider};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;

/// OpenRouter API provider
///
/// # Examples
///
/// ```
/// use aidroid::config::OpenRouterConfig;
/// use aidroid::providers::OpenRouterProvider;
///
/// let provider = OpenRouterProvider::new(OpenRouterConfig::default());
/// assert!(provider.is_ok());
/// ```
pub struct OpenRouterProvider {
    client: Client,
    config: OpenRouterConfig,
}

/// Response from `/models`
#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    context_length: Option<u64>,
}

/// Non-streaming completion response
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenRouterProvider {
    /// Create a new provider instance
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(config: OpenRouterConfig) -> Result<Self> {
        // No client-wide timeout: it would also bound a healthy streamed body
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("aidroid/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AidroidError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized OpenRouter provider: base={}, model={}",
            config.api_base,
            config.model
        );

        Ok(Self { client, config })
    }

    /// Configured default model
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn with_headers(&self, builder: RequestBuilder, api_key: &str) -> RequestBuilder {
        builder
            .bearer_auth(api_key)
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
    }

    async fn send_checked(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await.map_err(|e| {
            tracing::warn!("OpenRouter request failed: {}", e);
            AidroidError::Transport(format!("Failed to reach model API: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("OpenRouter returned error {}: {}", status, body);
            return Err(AidroidError::Transport(format!(
                "Model API returned {}: {}",
                status, body
            ))
            .into());
        }

        Ok(response)
    }
}

/// Map body chunks to crate errors and fail once the body stays silent for `idle`
///
/// Only the gap between chunks is bounded, so a slow but live stream runs to
/// completion. The stream ends after the first error.
fn idle_bounded<S>(body: S, idle: Duration) -> impl futures::Stream<Item = Result<Bytes>> + Send
where
    S: futures::Stream<Item = reqwest::Result<Bytes>> + Send + Unpin,
{
    futures::stream::unfold(Some(body), move |state| async move {
        let mut body = state?;
        match tokio::time::timeout(idle, body.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(body))),
            Ok(Some(Err(e))) => Some((
                Err(AidroidError::Transport(format!("Stream interrupted: {}", e)).into()),
                None,
            )),
            Ok(None) => None,
            Err(_) => Some((
                Err(AidroidError::Transport(format!(
                    "Stream idle for more than {}s",
                    idle.as_secs()
                ))
                .into()),
                None,
            )),
        }
    })
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn complete(&self, api_key: &str, request: &ChatRequest) -> Result<String> {
        let url = self.endpoint("chat/completions");
        tracing::debug!("POST {} model={} stream=false", url, request.model);

        let builder = self
            .with_headers(self.client.post(&url), api_key)
            .timeout(self.timeout())
            .json(request);
        let response = self.send_checked(builder).await?;

        let body: CompletionResponse = response.json().await.map_err(|e| {
            AidroidError::Protocol(format!("Failed to parse completion response: {}", e))
        })?;

        let text = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AidroidError::Protocol("Completion response has no choices".into()))?
            .message
            .content
            .unwrap_or_default();

        Ok(text)
    }

    async fn stream(&self, api_key: &str, request: &ChatRequest) -> Result<ByteStream> {
        let url = self.endpoint("chat/completions");
        tracing::debug!("POST {} model={} stream=true", url, request.model);

        let builder = self
            .with_headers(self.client.post(&url), api_key)
            .header("Accept", "text/event-stream")
            .json(request);
        let idle = self.timeout();
        let response = tokio::time::timeout(idle, self.send_checked(builder))
            .await
            .map_err(|_| {
                AidroidError::Transport(format!(
                    "No response from model API within {}s",
                    idle.as_secs()
                ))
            })??;

        Ok(Box::pin(idle_bounded(Box::pin(response.bytes_stream()), idle)))
    }

    async fn list_models(&self, api_key: &str) -> Result<Vec<ModelInfo>> {
        let url = self.endpoint("models");
        tracing::debug!("Fetching models from {}", url);

        let response = self
            .send_checked(
                self.with_headers(self.client.get(&url), api_key)
                    .timeout(self.timeout()),
            )
            .await?;
        let body: ModelsResponse = response
            .json()
            .await
            .map_err(|e| AidroidError::Protocol(format!("Failed to parse models: {}", e)))?;

        let models: Vec<ModelInfo> = body
            .data
            .into_iter()
            .map(|m| ModelInfo {
                name: m.name.unwrap_or_else(|| m.id.clone()),
                id: m.id,
                context_length: m.context_length,
            })
            .collect();

        tracing::debug!("Fetched {} models", models.len());
        Ok(models)
    }
}
