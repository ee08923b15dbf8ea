//! Provider module for aiDroid
//!
//! This module contains the model API abstraction, the OpenRouter client,
//! and the decoder for streamed completion bodies.

pub mod base;
pub mod openrouter;
pub mod sse;

pub use base::{ByteStream, ChatRequest, Message, ModelInfo, Provider};
pub use openrouter::OpenRouterProvider;
