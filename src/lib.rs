//! aiDroid - code generation with conversation memory
//!
//! This library stores past prompt/response exchanges, folds the relevant
//! ones back into outgoing system prompts, and drives cancellable streamed
//! completions against OpenRouter.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `storage`: Conversation, project context and snippet persistence
//! - `context`: Recent-history, project and similarity sections for prompts
//! - `generation`: Streaming and blocking generation sessions with cancellation
//! - `providers`: Model API abstraction, OpenRouter client and SSE decoding
//! - `maintenance`: Retention cleanup and statistics
//! - `cache`: File-backed response cache
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli` / `commands`: Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use aidroid::generation::{GenerateRequest, GenerationSession};
//! use aidroid::providers::OpenRouterProvider;
//! use aidroid::storage::SqliteStore;
//! use aidroid::Config;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let provider = Arc::new(OpenRouterProvider::new(config.openrouter.clone())?);
//!     let store = Arc::new(SqliteStore::new()?);
//!     let session =
//!         GenerationSession::new(provider, store, config.generation.clone(), &config.memory);
//!
//!     let request = GenerateRequest::new("sk-...", "openai/gpt-4o-mini", "Write a tokenizer");
//!     let cancel = session.begin_request();
//!     let outcome = session
//!         .generate_stream(&request, |token| print!("{}", token), &cancel)
//!         .await?;
//!     println!("\n{:?}", outcome.state);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod generation;
pub mod maintenance;
pub mod metrics;
pub mod providers;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use context::ContextComposer;
pub use error::{AidroidError, Result};
pub use generation::{GenerateRequest, GenerationOutcome, GenerationSession, GenerationState};
pub use maintenance::MaintenanceOps;
pub use storage::{ConversationStore, InMemoryStore, SqliteStore};

#[cfg(test)]
pub(crate) mod test_utils;
