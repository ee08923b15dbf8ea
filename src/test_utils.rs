//! Test utilities for aiDroid
//!
//! Provides a scripted [`FakeProvider`] that replays prepared SSE bodies and
//! records the requests it receives, plus small helpers for building
//! stream frames.

use crate::error::{AidroidError, Result};
use crate::providers::{ByteStream, ChatRequest, ModelInfo, Provider};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One SSE `data:` line carrying `content` as an incremental delta
pub fn token_frame(content: &str) -> String {
    let payload = serde_json::json!({
        "choices": [{ "delta": { "content": content } }]
    });
    format!("data: {}\n\n", payload)
}

/// The end-of-stream frame
pub fn done_frame() -> String {
    "data: [DONE]\n\n".to_string()
}

enum Scripted {
    Chunk(Bytes),
    Error(String),
}

/// Provider that replays a fixed script instead of calling a model API
pub struct FakeProvider {
    script: Vec<(usize, String)>,
    fail_at: Option<usize>,
    completion: std::result::Result<String, String>,
    stream_error: Option<String>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl FakeProvider {
    /// Stream each frame as its own body chunk
    pub fn with_frames<I, S>(frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: frames.into_iter().map(Into::into).enumerate().collect(),
            fail_at: None,
            completion: Ok(String::new()),
            stream_error: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Stream `tokens` followed by `[DONE]`
    pub fn with_tokens(tokens: &[&str]) -> Self {
        let mut frames: Vec<String> = tokens.iter().map(|t| token_frame(t)).collect();
        frames.push(done_frame());
        Self::with_frames(frames)
    }

    /// Answer blocking completions with `text`
    pub fn with_completion(text: &str) -> Self {
        Self {
            completion: Ok(text.to_string()),
            ..Self::with_frames(Vec::<String>::new())
        }
    }

    /// Fail `stream` and `complete` before any body is produced
    pub fn failing(message: &str) -> Self {
        Self {
            completion: Err(message.to_string()),
            stream_error: Some(message.to_string()),
            ..Self::with_frames(Vec::<String>::new())
        }
    }

    /// Interrupt the body with a transport error before chunk `index`
    pub fn interrupted_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Number of `stream` or `complete` calls made
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Last request received, if any
    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().ok().and_then(|r| r.last().cloned())
    }

    fn record(&self, request: &ChatRequest) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn complete(&self, _api_key: &str, request: &ChatRequest) -> Result<String> {
        self.record(request);
        self.completion
            .clone()
            .map_err(|e| AidroidError::Transport(e).into())
    }

    async fn stream(&self, _api_key: &str, request: &ChatRequest) -> Result<ByteStream> {
        self.record(request);
        if let Some(message) = &self.stream_error {
            return Err(AidroidError::Transport(message.clone()).into());
        }

        let mut items: Vec<Scripted> = Vec::new();
        for (idx, frame) in &self.script {
            if self.fail_at == Some(*idx) {
                items.push(Scripted::Error("connection reset".to_string()));
                break;
            }
            items.push(Scripted::Chunk(Bytes::from(frame.clone())));
        }
        if self.fail_at.map_or(false, |at| at >= self.script.len()) {
            items.push(Scripted::Error("connection reset".to_string()));
        }

        let stream = futures::stream::iter(items.into_iter().map(|item| -> Result<Bytes> {
            match item {
                Scripted::Chunk(bytes) => Ok(bytes),
                Scripted::Error(msg) => Err(AidroidError::Transport(msg).into()),
            }
        }));
        Ok(Box::pin(stream))
    }

    async fn list_models(&self, _api_key: &str) -> Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo {
            id: "fake/model".to_string(),
            name: "Fake Model".to_string(),
            context_length: Some(4096),
        }])
    }
}
