//! Decoder for `text/event-stream` completion bodies
//!
//! The model API streams newline-delimited `data: <json>` frames and ends
//! with `data: [DONE]`. [`LineDecoder`] reassembles lines across arbitrary
//! byte chunk boundaries and [`classify_line`] turns each line into a
//! [`Frame`].

use crate::error::{AidroidError, Result};
use serde::Deserialize;

/// Sentinel payload that terminates a stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// One interpreted `data:` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Incremental content
    Token(String),
    /// A well-formed frame without content (role announcement, usage, ...)
    Empty,
    /// End of stream
    Done,
    /// Frame whose payload does not have the incremental-delta shape
    Malformed(String),
}

/// Reassembles complete lines from a byte stream
///
/// Bytes are buffered until a `\n` arrives, so multi-byte UTF-8 sequences
/// split across chunks decode correctly.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completes
    ///
    /// # Examples
    ///
    /// ```
    /// use aidroid::providers::sse::LineDecoder;
    ///
    /// let mut decoder = LineDecoder::new();
    /// assert!(decoder.push(b"data: {\"a\"").is_empty());
    /// assert_eq!(decoder.push(b":1}\r\n\n"), vec!["data: {\"a\":1}", ""]);
    /// ```
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Return the trailing partial line, if any, once the body has ended
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
        Some(line)
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Classify one SSE line
///
/// Returns `None` for lines that carry no data: blank separators,
/// `:` comments (OpenRouter sends keep-alive comments) and other fields
/// such as `event:` or `id:`.
///
/// # Examples
///
/// ```
/// use aidroid::providers::sse::{classify_line, Frame};
///
/// let line = r#"data: {"choices":[{"delta":{"content":"fn"}}]}"#;
/// assert_eq!(classify_line(line), Some(Frame::Token("fn".to_string())));
/// assert_eq!(classify_line("data: [DONE]"), Some(Frame::Done));
/// assert_eq!(classify_line(": OPENROUTER PROCESSING"), None);
/// ```
pub fn classify_line(line: &str) -> Option<Frame> {
    let data = line.strip_prefix("data:")?.trim();
    if data == DONE_SENTINEL {
        return Some(Frame::Done);
    }

    Some(match parse_delta(data) {
        Ok(Some(token)) => Frame::Token(token),
        Ok(None) => Frame::Empty,
        Err(e) => Frame::Malformed(e.to_string()),
    })
}

/// Extract `choices[0].delta.content` from a frame payload
///
/// # Errors
///
/// Returns [`AidroidError::Protocol`] when the payload is not JSON or has
/// no `choices` array.
pub fn parse_delta(data: &str) -> Result<Option<String>> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| AidroidError::Protocol(format!("Unparseable stream frame: {}", e)))?;

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .filter(|content| !content.is_empty()))
}
