//! Streaming generation session
//!
//! Drives one request at a time through
//! `Idle -> Composing -> Streaming -> {Completed, Cancelled, Failed}`:
//!
//! - composition runs on the blocking pool and is not cancellable
//! - each streamed token is handed to the caller's callback and appended
//!   to the accumulated text
//! - the cancellation token is checked before every frame, so a frame
//!   already being handled finishes first
//! - only a completed, non-empty result is written to the store

use crate::cache::{CacheKey, ResponseCache};
use crate::config::{GenerationConfig, MemoryConfig};
use crate::context::ContextComposer;
use crate::error::{AidroidError, Result};
use crate::metrics::GenerationMetrics;
use crate::providers::sse::{classify_line, Frame, LineDecoder};
use crate::providers::{ChatRequest, Provider};
use crate::storage::{ConversationStore, NewConversation};

use futures::StreamExt;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Tags stored with streamed exchanges
pub const STREAM_TAGS: [&str; 2] = ["streaming", "code-generation"];
/// Tags stored with blocking exchanges
pub const ONCE_TAGS: [&str; 1] = ["code-generation"];

/// Lifecycle of the current request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Idle,
    Composing,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl GenerationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Composing => "composing",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transitions happen for this request
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub api_key: String,
    pub model: String,
    /// Base system prompt; stored as-is, before context is appended
    pub system_prompt: String,
    pub user_prompt: String,
    pub use_context: bool,
    pub project_context: Option<String>,
    pub save_to_memory: bool,
}

impl GenerateRequest {
    /// Request with context and persistence enabled and no system prompt
    ///
    /// # Examples
    ///
    /// ```
    /// use aidroid::generation::GenerateRequest;
    ///
    /// let request = GenerateRequest::new("sk-test", "openai/gpt-4o-mini", "write a lexer")
    ///     .with_project("compiler")
    ///     .without_context();
    /// assert!(!request.use_context);
    /// assert!(request.save_to_memory);
    /// assert_eq!(request.project_context.as_deref(), Some("compiler"));
    /// ```
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            system_prompt: String::new(),
            user_prompt: user_prompt.into(),
            use_context: true,
            project_context: None,
            save_to_memory: true,
        }
    }

    /// Take the system prompt and toggles from configuration
    pub fn with_defaults(mut self, defaults: &GenerationConfig) -> Self {
        self.system_prompt = defaults.system_prompt.clone();
        self.use_context = defaults.use_context;
        self.save_to_memory = defaults.save_to_memory;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project_context = Some(project.into());
        self
    }

    pub fn without_context(mut self) -> Self {
        self.use_context = false;
        self
    }

    pub fn without_save(mut self) -> Self {
        self.save_to_memory = false;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(AidroidError::Validation("API key is required".to_string()).into());
        }
        if self.model.trim().is_empty() {
            return Err(AidroidError::Validation("Model is required".to_string()).into());
        }
        if self.user_prompt.trim().is_empty() {
            return Err(AidroidError::Validation("Prompt cannot be empty".to_string()).into());
        }
        Ok(())
    }
}

/// Result of a request that did not fail
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    /// Accumulated text; partial when cancelled
    pub text: String,
    /// `Completed` or `Cancelled`
    pub state: GenerationState,
    /// Id of the stored conversation, when one was written
    pub record_id: Option<i64>,
    /// Set when the text was produced but could not be stored
    pub storage_error: Option<String>,
}

impl GenerationOutcome {
    fn new(text: String, state: GenerationState) -> Self {
        Self {
            text,
            state,
            record_id: None,
            storage_error: None,
        }
    }
}

/// Per-frame bookkeeping for one stream
#[derive(Debug, Default)]
struct StreamTally {
    frames: usize,
    tokens: usize,
    malformed: usize,
}

/// Generation session bound to one provider and one store
pub struct GenerationSession {
    provider: Arc<dyn Provider>,
    store: Arc<dyn ConversationStore>,
    composer: Arc<ContextComposer>,
    sampling: GenerationConfig,
    cache: Option<ResponseCache>,
    state: Mutex<GenerationState>,
    active: Mutex<Option<CancellationToken>>,
}

impl GenerationSession {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<dyn ConversationStore>,
        sampling: GenerationConfig,
        memory: &MemoryConfig,
    ) -> Self {
        let composer = Arc::new(ContextComposer::new(store.clone(), memory));
        Self {
            provider,
            store,
            composer,
            sampling,
            cache: None,
            state: Mutex::new(GenerationState::Idle),
            active: Mutex::new(None),
        }
    }

    /// Serve blocking requests from `cache` when possible
    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn composer(&self) -> &ContextComposer {
        &self.composer
    }

    pub fn state(&self) -> GenerationState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(GenerationState::Failed)
    }

    fn set_state(&self, next: GenerationState) {
        if let Ok(mut state) = self.state.lock() {
            tracing::debug!("Generation state: {} -> {}", *state, next);
            *state = next;
        }
    }

    /// Cancel the in-flight request, if any, and hand out a fresh token
    pub fn begin_request(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Ok(mut active) = self.active.lock() {
            if let Some(previous) = active.replace(token.clone()) {
                if !previous.is_cancelled() {
                    tracing::info!("Cancelling previous generation request");
                    previous.cancel();
                }
            }
        }
        token
    }

    async fn compose(&self, request: &GenerateRequest) -> String {
        self.set_state(GenerationState::Composing);

        let composer = self.composer.clone();
        let base = request.system_prompt.clone();
        let use_context = request.use_context;
        let project = request.project_context.clone();
        let user_prompt = request.user_prompt.clone();

        let composed = tokio::task::spawn_blocking(move || {
            composer.compose_enhanced_system_prompt(
                &base,
                use_context,
                project.as_deref(),
                &user_prompt,
            )
        })
        .await;

        match composed {
            Ok(prompt) => prompt,
            Err(e) => {
                tracing::warn!("Context composition task failed, using base prompt: {}", e);
                request.system_prompt.clone()
            }
        }
    }

    async fn persist(&self, request: &GenerateRequest, text: &str, tags: &[&str]) -> Result<i64> {
        let mut new = NewConversation::new(request.user_prompt.clone(), text)
            .with_system_prompt(request.system_prompt.clone())
            .with_model(request.model.clone())
            .with_tags(tags.iter().copied());
        if let Some(project) = &request.project_context {
            new = new.with_project(project.clone());
        }

        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.add_conversation(new))
            .await
            .map_err(|e| AidroidError::Storage(format!("Storage task failed: {}", e)))?
    }

    async fn finish_completed(
        &self,
        request: &GenerateRequest,
        text: String,
        tags: &[&str],
    ) -> GenerationOutcome {
        let mut outcome = GenerationOutcome::new(text, GenerationState::Completed);

        if request.save_to_memory && !outcome.text.is_empty() {
            match self.persist(request, &outcome.text, tags).await {
                Ok(id) => {
                    tracing::debug!("Stored conversation {}", id);
                    outcome.record_id = Some(id);
                }
                Err(e) => {
                    tracing::warn!("Failed to store conversation: {}", e);
                    outcome.storage_error = Some(e.to_string());
                }
            }
        }

        self.set_state(GenerationState::Completed);
        outcome
    }

    fn fail<T>(&self, metrics: &GenerationMetrics, tokens: usize, err: anyhow::Error) -> Result<T> {
        tracing::error!("Generation failed: {}", err);
        self.set_state(GenerationState::Failed);
        metrics.record_outcome(GenerationState::Failed.as_str(), tokens);
        Err(err)
    }

    /// Stream a completion, delivering each token to `on_token`
    ///
    /// Returns `Ok` with state `Cancelled` and the partial text when
    /// `cancel` fires; nothing is stored in that case.
    ///
    /// # Errors
    ///
    /// - [`AidroidError::Validation`] for an empty key, model or prompt
    /// - [`AidroidError::Transport`] when the request or body fails
    /// - [`AidroidError::Protocol`] when every received frame was malformed
    pub async fn generate_stream<F>(
        &self,
        request: &GenerateRequest,
        mut on_token: F,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome>
    where
        F: FnMut(&str) + Send,
    {
        request.validate()?;
        let metrics = GenerationMetrics::new("stream");

        let system_prompt = self.compose(request).await;
        let chat = ChatRequest::new(
            request.model.clone(),
            system_prompt,
            request.user_prompt.clone(),
            &self.sampling,
            true,
        );

        self.set_state(GenerationState::Streaming);
        tracing::info!(
            "Streaming generation via {} (model={})",
            self.provider.name(),
            request.model
        );

        let mut body = match self.provider.stream(&request.api_key, &chat).await {
            Ok(body) => body,
            Err(e) => return self.fail(&metrics, 0, e),
        };

        let mut decoder = LineDecoder::new();
        let mut text = String::new();
        let mut tally = StreamTally::default();
        let mut saw_done = false;
        let mut cancelled = false;

        'stream: loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                chunk = body.next() => Some(chunk),
            };
            let Some(chunk) = next else {
                cancelled = true;
                break;
            };

            let (lines, ended) = match chunk {
                Some(Ok(bytes)) => (decoder.push(&bytes), false),
                Some(Err(e)) => return self.fail(&metrics, tally.tokens, e),
                None => (decoder.finish().into_iter().collect(), true),
            };

            for line in lines {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break 'stream;
                }

                match classify_line(&line) {
                    None => {}
                    Some(Frame::Done) => {
                        saw_done = true;
                        break 'stream;
                    }
                    Some(Frame::Token(token)) => {
                        tally.frames += 1;
                        tally.tokens += 1;
                        on_token(&token);
                        text.push_str(&token);
                    }
                    Some(Frame::Empty) => tally.frames += 1,
                    Some(Frame::Malformed(reason)) => {
                        tally.frames += 1;
                        tally.malformed += 1;
                        tracing::warn!("Skipping malformed stream frame: {}", reason);
                    }
                }
            }

            if ended {
                break;
            }
        }

        if cancelled {
            tracing::info!("Generation cancelled after {} tokens", tally.tokens);
            self.set_state(GenerationState::Cancelled);
            metrics.record_outcome(GenerationState::Cancelled.as_str(), tally.tokens);
            return Ok(GenerationOutcome::new(text, GenerationState::Cancelled));
        }

        if tally.frames > 0 && tally.malformed == tally.frames {
            let err = AidroidError::Protocol(format!(
                "All {} stream frames were malformed",
                tally.frames
            ));
            return self.fail(&metrics, 0, err.into());
        }

        if !saw_done {
            tracing::debug!("Stream ended without a [DONE] frame");
        }

        let outcome = self.finish_completed(request, text, &STREAM_TAGS).await;
        metrics.record_outcome(GenerationState::Completed.as_str(), tally.tokens);
        tracing::info!(
            "Generation completed: {} tokens, {} chars",
            tally.tokens,
            outcome.text.len()
        );
        Ok(outcome)
    }

    /// Issue a single blocking completion
    ///
    /// Composition and persistence match [`generate_stream`](Self::generate_stream);
    /// there is no cancellation path. With a cache attached, a fresh hit for
    /// the same model, prompts, project and history setting skips the
    /// provider call. The exchange is still stored.
    pub async fn generate_once(&self, request: &GenerateRequest) -> Result<GenerationOutcome> {
        request.validate()?;
        let metrics = GenerationMetrics::new("once");

        let cache_key = CacheKey::new(
            request.model.clone(),
            request.system_prompt.clone(),
            request.user_prompt.clone(),
        )
        .scoped(request.project_context.as_deref(), request.use_context);
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(&cache_key)) {
            tracing::info!("Serving response from cache");
            let outcome = self.finish_completed(request, cached, &ONCE_TAGS).await;
            metrics.record_outcome(GenerationState::Completed.as_str(), 0);
            return Ok(outcome);
        }

        let system_prompt = self.compose(request).await;
        let chat = ChatRequest::new(
            request.model.clone(),
            system_prompt,
            request.user_prompt.clone(),
            &self.sampling,
            false,
        );

        self.set_state(GenerationState::Streaming);
        let text = match self.provider.complete(&request.api_key, &chat).await {
            Ok(text) => text,
            Err(e) => return self.fail(&metrics, 0, e),
        };

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(&cache_key, &text) {
                tracing::warn!("Failed to cache response: {}", e);
            }
        }

        let outcome = self.finish_completed(request, text, &ONCE_TAGS).await;
        metrics.record_outcome(GenerationState::Completed.as_str(), 0);
        Ok(outcome)
    }
}
