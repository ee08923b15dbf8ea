//! File-backed response cache
//!
//! One JSON file per request, named `cache_<digest>.json` where the digest
//! is a SHA-256 prefix over the model, system prompt, user prompt, project
//! and whether conversation history was requested.

use crate::error::{AidroidError, Result};
use chrono::Utc;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CACHE_FILE_PREFIX: &str = "cache_";
const CACHE_FILE_SUFFIX: &str = ".json";

/// Material a cached response is keyed on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    #[serde(default)]
    pub project_context: Option<String>,
    #[serde(default)]
    pub use_context: bool,
}

impl CacheKey {
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            project_context: None,
            use_context: false,
        }
    }

    /// Scope the key to a project and to whether history is composed in
    pub fn scoped(mut self, project_context: Option<&str>, use_context: bool) -> Self {
        self.project_context = project_context.map(str::to_string);
        self.use_context = use_context;
        self
    }

    /// Hex digest used in the file name
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.model.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.system_prompt.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.user_prompt.as_bytes());
        hasher.update([0u8]);
        match &self.project_context {
            Some(project) => {
                hasher.update([1u8]);
                hasher.update(project.as_bytes());
            }
            None => hasher.update([0u8]),
        }
        hasher.update([u8::from(self.use_context)]);
        let hex: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        hex[..32].to_string()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    key: CacheKey,
    response: String,
    created_at: i64,
}

/// Summary of the cache directory contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInfo {
    pub dir: PathBuf,
    pub file_count: usize,
    pub total_bytes: u64,
}

/// Response cache rooted at a directory
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    ttl: Duration,
}

impl ResponseCache {
    /// Open a cache at `dir`, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new<P: Into<PathBuf>>(dir: P, ttl: Duration) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(AidroidError::from)?;
        Ok(Self { dir, ttl })
    }

    /// Default location under the per-user cache directory
    pub fn default_dir() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("app", "aidroid", "aidroid").ok_or_else(|| {
            AidroidError::Config("Could not determine a per-user cache directory".to_string())
        })?;
        Ok(dirs.cache_dir().join("responses"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", CACHE_FILE_PREFIX, key.digest(), CACHE_FILE_SUFFIX))
    }

    /// Cached response for `key`, if present and younger than the TTL
    ///
    /// Unreadable or corrupt entries are treated as misses.
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        let path = self.entry_path(key);
        let raw = std::fs::read_to_string(&path).ok()?;
        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Ignoring corrupt cache entry {}: {}", path.display(), e);
                return None;
            }
        };

        if entry.key != *key {
            return None;
        }

        let age = Utc::now().timestamp().saturating_sub(entry.created_at);
        if age < 0 || age as u64 >= self.ttl.as_secs() {
            tracing::debug!("Cache entry {} expired ({}s old)", path.display(), age);
            return None;
        }

        tracing::debug!("Cache hit: {}", path.display());
        Some(entry.response)
    }

    /// Store `response` under `key`
    pub fn put(&self, key: &CacheKey, response: &str) -> Result<()> {
        let entry = CacheEntry {
            key: key.clone(),
            response: response.to_string(),
            created_at: Utc::now().timestamp(),
        };
        let path = self.entry_path(key);
        let bytes = serde_json::to_vec(&entry).map_err(AidroidError::from)?;
        std::fs::write(&path, bytes).map_err(AidroidError::from)?;
        tracing::debug!("Cached response at {}", path.display());
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(PathBuf, u64)>> {
        let mut found = Vec::new();
        for item in std::fs::read_dir(&self.dir).map_err(AidroidError::from)? {
            let item = item.map_err(AidroidError::from)?;
            let name = item.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(CACHE_FILE_PREFIX) && name.ends_with(CACHE_FILE_SUFFIX) {
                let size = item.metadata().map_err(AidroidError::from)?.len();
                found.push((item.path(), size));
            }
        }
        Ok(found)
    }

    /// Delete every cache file and return how many were removed
    pub fn clear(&self) -> Result<usize> {
        let entries = self.entries()?;
        for (path, _) in &entries {
            std::fs::remove_file(path).map_err(AidroidError::from)?;
        }
        tracing::info!("Cleared {} cached responses", entries.len());
        Ok(entries.len())
    }

    pub fn info(&self) -> Result<CacheInfo> {
        let entries = self.entries()?;
        Ok(CacheInfo {
            dir: self.dir.clone(),
            file_count: entries.len(),
            total_bytes: entries.iter().map(|(_, size)| size).sum(),
        })
    }
}
