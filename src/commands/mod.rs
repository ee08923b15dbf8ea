/*!
Command handlers for the CLI

Each submodule backs one group of subcommands:

- `generate` and `chat` drive a [`GenerationSession`]
- `history` covers history, similarity search, statistics and cleanup
- `project` covers project contexts and snippets
- `models` and `cache` talk to OpenRouter and the response cache
*/

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::error::Result;
use crate::generation::GenerationSession;
use crate::providers::OpenRouterProvider;
use crate::storage::{ConversationStore, SqliteStore};
use std::sync::Arc;
use std::time::Duration;

pub mod cache;
pub mod chat;
pub mod generate;
pub mod history;
pub mod models;
pub mod project;

/// Open the conversation database named by the configuration
pub fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let store = match &config.memory.db_path {
        Some(path) => SqliteStore::new_with_path(path.clone())?,
        None => SqliteStore::new()?,
    };
    Ok(Arc::new(store))
}

/// Open the response cache at its configured or default location
pub fn open_cache(config: &Config) -> Result<ResponseCache> {
    let dir = match &config.cache.dir {
        Some(dir) => dir.clone(),
        None => ResponseCache::default_dir()?,
    };
    ResponseCache::new(dir, Duration::from_secs(config.cache.ttl_seconds))
}

/// Wire provider, store and optional cache into a session
pub fn build_session(config: &Config, store: Arc<dyn ConversationStore>) -> Result<GenerationSession> {
    let provider = Arc::new(OpenRouterProvider::new(config.openrouter.clone())?);
    let mut session = GenerationSession::new(
        provider,
        store,
        config.generation.clone(),
        &config.memory,
    );

    if config.cache.enabled {
        match open_cache(config) {
            Ok(cache) => session = session.with_cache(cache),
            Err(e) => tracing::warn!("Response cache disabled: {}", e),
        }
    }

    Ok(session)
}

/// Shorten `text` to one line of at most `max` characters for tables
pub(crate) fn one_line(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    crate::context::truncate_chars(&flat, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_store_uses_configured_path() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.memory.db_path = Some(dir.path().join("nested").join("mem.db"));

        let store = open_store(&config).unwrap();
        assert_eq!(store.db_path(), dir.path().join("nested").join("mem.db"));
        assert!(store.db_path().exists());
    }

    #[test]
    fn test_open_cache_uses_configured_dir() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.cache.dir = Some(dir.path().join("responses"));

        let cache = open_cache(&config).unwrap();
        assert_eq!(cache.dir(), dir.path().join("responses"));
    }

    #[test]
    fn test_one_line_flattens_whitespace() {
        assert_eq!(one_line("fn main() {\n    x\n}", 100), "fn main() { x }");
        assert_eq!(one_line("abcdef", 3), "abc...");
    }
}
