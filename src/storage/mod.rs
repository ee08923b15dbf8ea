//! Conversation memory storage
//!
//! The [`ConversationStore`] trait isolates the persistence engine from the
//! context composer and the generation session. [`SqliteStore`] is the
//! durable backend; [`InMemoryStore`] backs tests and throwaway sessions.

use crate::error::{AidroidError, Result};
use chrono::Utc;
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub mod memory;
pub mod types;

pub use memory::InMemoryStore;
pub use types::{
    code_fingerprint, session_bucket, CodeSnippet, ContextData, ConversationRecord,
    MemoryStatistics, NewCodeSnippet, NewConversation, ProjectContext, DEFAULT_SNIPPET_LANGUAGE,
};
use types::{format_timestamp, parse_timestamp, retention_cutoff};

/// Environment variable that overrides the database location
pub const MEMORY_DB_ENV: &str = "AIDROID_MEMORY_DB";

/// File name of the database inside the per-user cache directory
pub const DEFAULT_DB_FILE: &str = "aidroid_memory.db";

/// Durable CRUD over conversations, project contexts and code snippets
///
/// Implementations serialize writes and make every call atomic. Returned
/// values are plain copies; nothing handed out aliases store state.
pub trait ConversationStore: Send + Sync {
    /// Persist an exchange and return its id
    fn add_conversation(&self, new: NewConversation) -> Result<i64>;

    /// Most recent conversations first, optionally restricted to one project
    fn get_recent_conversations(
        &self,
        limit: usize,
        project_context: Option<&str>,
    ) -> Result<Vec<ConversationRecord>>;

    /// Most recent conversation whose generated code has this fingerprint
    fn find_by_code_hash(&self, code_hash: &str) -> Result<Option<ConversationRecord>>;

    /// Insert or replace the context stored under `name`
    fn save_project_context(&self, name: &str, context_data: &ContextData) -> Result<()>;

    fn get_project_context(&self, name: &str) -> Result<Option<ContextData>>;

    fn save_code_snippet(&self, snippet: NewCodeSnippet) -> Result<i64>;

    fn get_code_snippet(&self, id: i64) -> Result<Option<CodeSnippet>>;

    /// Snippets by usage count, then creation time, both descending
    ///
    /// `tag` is matched as a substring of the serialized tag list, so
    /// `"py"` matches a snippet tagged `"python"`.
    fn get_code_snippets(
        &self,
        language: Option<&str>,
        tag: Option<&str>,
    ) -> Result<Vec<CodeSnippet>>;

    fn increment_snippet_usage(&self, id: i64) -> Result<()>;

    /// Delete conversations older than `days_to_keep` days; `0` deletes all
    fn cleanup_old_conversations(&self, days_to_keep: u32) -> Result<usize>;

    fn get_statistics(&self) -> Result<MemoryStatistics>;
}

/// SQLite-backed conversation store
///
/// Holds a single connection behind a mutex so all reads and writes are
/// serialized through one handle.
pub struct SqliteStore {
    db_path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the store at its default location
    ///
    /// Uses `AIDROID_MEMORY_DB` when set, otherwise `aidroid_memory.db` in
    /// the per-user cache directory.
    pub fn new() -> Result<Self> {
        Self::new_with_path(default_db_path()?)
    }

    /// Open (or create) the store at the given path
    ///
    /// # Examples
    ///
    /// ```
    /// use aidroid::storage::{ConversationStore, NewConversation, SqliteStore};
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let store = SqliteStore::new_with_path(dir.path().join("memory.db")).unwrap();
    /// let id = store
    ///     .add_conversation(NewConversation::new("hello", "print('hi')"))
    ///     .unwrap();
    /// assert_eq!(store.get_recent_conversations(1, None).unwrap()[0].id, id);
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AidroidError::Storage(format!(
                        "Failed to create parent directory for database: {}",
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(&db_path)
            .map_err(|e| AidroidError::Storage(format!("Failed to open database: {}", e)))?;
        init_schema(&conn)?;

        tracing::debug!("Opened conversation store at {}", db_path.display());

        Ok(Self {
            db_path,
            conn: Mutex::new(conn),
        })
    }

    /// Location of the database file
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AidroidError::Storage("Database handle poisoned".to_string()).into())
    }
}

/// Resolve the default database path
pub fn default_db_path() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var(MEMORY_DB_ENV) {
        return Ok(PathBuf::from(override_path));
    }

    let proj_dirs = ProjectDirs::from("app", "aidroid", "aidroid")
        .ok_or_else(|| AidroidError::Storage("Could not determine cache directory".into()))?;

    Ok(proj_dirs.cache_dir().join(DEFAULT_DB_FILE))
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            user_prompt TEXT NOT NULL,
            system_prompt TEXT NOT NULL DEFAULT '',
            model_used TEXT NOT NULL DEFAULT '',
            generated_code TEXT NOT NULL DEFAULT '',
            code_hash TEXT NOT NULL,
            project_context TEXT,
            tags TEXT NOT NULL DEFAULT '[]'
        );
        CREATE TABLE IF NOT EXISTS project_contexts (
            project_name TEXT PRIMARY KEY,
            context_data TEXT NOT NULL,
            last_updated TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS code_snippets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            code TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            language TEXT NOT NULL DEFAULT 'python',
            tags TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            used_count INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_timestamp ON conversations(timestamp);
        CREATE INDEX IF NOT EXISTS idx_conversations_code_hash ON conversations(code_hash);
        CREATE INDEX IF NOT EXISTS idx_conversations_project ON conversations(project_context);",
    )
    .map_err(|e| AidroidError::Storage(format!("Failed to create tables: {}", e)))?;

    Ok(())
}

const CONVERSATION_COLUMNS: &str = "id, session_id, timestamp, user_prompt, system_prompt, \
     model_used, generated_code, code_hash, project_context, tags";

const SNIPPET_COLUMNS: &str =
    "id, name, code, description, language, tags, created_at, used_count";

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRecord> {
    let timestamp: String = row.get(2)?;
    let tags: String = row.get(9)?;
    Ok(ConversationRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        timestamp: parse_timestamp(&timestamp),
        user_prompt: row.get(3)?,
        system_prompt: row.get(4)?,
        model_used: row.get(5)?,
        generated_code: row.get(6)?,
        code_hash: row.get(7)?,
        project_context: row.get(8)?,
        tags: decode_tags(&tags),
    })
}

fn snippet_from_row(row: &Row<'_>) -> rusqlite::Result<CodeSnippet> {
    let tags: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    let used_count: i64 = row.get(7)?;
    Ok(CodeSnippet {
        id: row.get(0)?,
        name: row.get(1)?,
        code: row.get(2)?,
        description: row.get(3)?,
        language: row.get(4)?,
        tags: decode_tags(&tags),
        created_at: parse_timestamp(&created_at),
        used_count: used_count.max(0) as u64,
    })
}

pub(crate) fn encode_tags(tags: &[String]) -> Result<String> {
    serde_json::to_string(tags)
        .map_err(|e| AidroidError::Storage(format!("Failed to serialize tags: {}", e)).into())
}

fn decode_tags(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!("Ignoring malformed tag list {:?}: {}", raw, e);
        Vec::new()
    })
}

fn storage_err(action: &'static str) -> impl Fn(rusqlite::Error) -> AidroidError {
    move |e| AidroidError::Storage(format!("Failed to {}: {}", action, e))
}

impl ConversationStore for SqliteStore {
    fn add_conversation(&self, new: NewConversation) -> Result<i64> {
        new.validate()?;
        let code_hash = code_fingerprint(&new.generated_code);
        let tags = encode_tags(&new.tags)?;

        let mut conn = self.lock()?;
        let now = Utc::now();
        let tx = conn
            .transaction()
            .map_err(storage_err("start transaction"))?;

        tx.execute(
            "INSERT INTO conversations
                (session_id, timestamp, user_prompt, system_prompt, model_used,
                 generated_code, code_hash, project_context, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                session_bucket(now),
                format_timestamp(now),
                new.user_prompt,
                new.system_prompt,
                new.model_used,
                new.generated_code,
                code_hash,
                new.project_context,
                tags,
            ],
        )
        .map_err(storage_err("insert conversation"))?;
        let id = tx.last_insert_rowid();

        tx.commit().map_err(storage_err("commit transaction"))?;

        tracing::debug!("Stored conversation {} (hash {})", id, code_hash);
        Ok(id)
    }

    fn get_recent_conversations(
        &self,
        limit: usize,
        project_context: Option<&str>,
    ) -> Result<Vec<ConversationRecord>> {
        let conn = self.lock()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let records = match project_context {
            Some(project) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM conversations WHERE project_context = ?1
                         ORDER BY timestamp DESC, id DESC LIMIT ?2",
                        CONVERSATION_COLUMNS
                    ))
                    .map_err(storage_err("prepare statement"))?;
                let rows = stmt
                    .query_map(params![project, limit], conversation_from_row)
                    .map_err(storage_err("query conversations"))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM conversations
                         ORDER BY timestamp DESC, id DESC LIMIT ?1",
                        CONVERSATION_COLUMNS
                    ))
                    .map_err(storage_err("prepare statement"))?;
                let rows = stmt
                    .query_map(params![limit], conversation_from_row)
                    .map_err(storage_err("query conversations"))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            }
        };

        Ok(records.map_err(storage_err("read conversation row"))?)
    }

    fn find_by_code_hash(&self, code_hash: &str) -> Result<Option<ConversationRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM conversations WHERE code_hash = ?1
                     ORDER BY timestamp DESC, id DESC LIMIT 1",
                    CONVERSATION_COLUMNS
                ),
                params![code_hash],
                conversation_from_row,
            )
            .optional()
            .map_err(storage_err("query conversation by hash"))?;
        Ok(record)
    }

    fn save_project_context(&self, name: &str, context_data: &ContextData) -> Result<()> {
        let data = serde_json::to_string(context_data).map_err(|e| {
            AidroidError::Storage(format!("Failed to serialize project context: {}", e))
        })?;
        let now = format_timestamp(Utc::now());

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO project_contexts (project_name, context_data, last_updated)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(project_name) DO UPDATE SET
                context_data = excluded.context_data,
                last_updated = excluded.last_updated",
            params![name, data, now],
        )
        .map_err(storage_err("save project context"))?;

        tracing::debug!("Saved project context '{}'", name);
        Ok(())
    }

    fn get_project_context(&self, name: &str) -> Result<Option<ContextData>> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT context_data FROM project_contexts WHERE project_name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err("query project context"))?;

        match raw {
            Some(raw) => {
                let data: ContextData = serde_json::from_str(&raw).map_err(|e| {
                    AidroidError::Storage(format!(
                        "Failed to deserialize project context '{}': {}",
                        name, e
                    ))
                })?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    fn save_code_snippet(&self, snippet: NewCodeSnippet) -> Result<i64> {
        let tags = encode_tags(&snippet.tags)?;
        let now = format_timestamp(Utc::now());

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(storage_err("start transaction"))?;
        tx.execute(
            "INSERT INTO code_snippets (name, code, description, language, tags, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                snippet.name,
                snippet.code,
                snippet.description,
                snippet.language,
                tags,
                now
            ],
        )
        .map_err(storage_err("insert code snippet"))?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(storage_err("commit transaction"))?;

        Ok(id)
    }

    fn get_code_snippet(&self, id: i64) -> Result<Option<CodeSnippet>> {
        let conn = self.lock()?;
        let snippet = conn
            .query_row(
                &format!("SELECT {} FROM code_snippets WHERE id = ?1", SNIPPET_COLUMNS),
                params![id],
                snippet_from_row,
            )
            .optional()
            .map_err(storage_err("query code snippet"))?;
        Ok(snippet)
    }

    fn get_code_snippets(
        &self,
        language: Option<&str>,
        tag: Option<&str>,
    ) -> Result<Vec<CodeSnippet>> {
        let conn = self.lock()?;
        // NULL parameters disable the corresponding filter.
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM code_snippets
                 WHERE (?1 IS NULL OR language = ?1)
                   AND (?2 IS NULL OR instr(tags, ?2) > 0)
                 ORDER BY used_count DESC, created_at DESC, id DESC",
                SNIPPET_COLUMNS
            ))
            .map_err(storage_err("prepare statement"))?;
        let rows = stmt
            .query_map(params![language, tag], snippet_from_row)
            .map_err(storage_err("query code snippets"))?;
        let snippets = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err("read code snippet row"))?;
        Ok(snippets)
    }

    fn increment_snippet_usage(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE code_snippets SET used_count = used_count + 1 WHERE id = ?1",
                params![id],
            )
            .map_err(storage_err("update snippet usage"))?;
        if updated == 0 {
            return Err(AidroidError::Storage(format!("No code snippet with id {}", id)).into());
        }
        Ok(())
    }

    fn cleanup_old_conversations(&self, days_to_keep: u32) -> Result<usize> {
        let cutoff = retention_cutoff(Utc::now(), days_to_keep);
        if days_to_keep > 0 && cutoff.is_none() {
            return Ok(0);
        }

        let conn = self.lock()?;
        let deleted = match cutoff {
            Some(cutoff) if days_to_keep > 0 => conn.execute(
                "DELETE FROM conversations WHERE timestamp < ?1",
                params![format_timestamp(cutoff)],
            ),
            _ => conn.execute("DELETE FROM conversations", []),
        }
        .map_err(storage_err("delete old conversations"))?;

        tracing::debug!("Deleted {} conversation rows (keep {} days)", deleted, days_to_keep);
        Ok(deleted)
    }

    fn get_statistics(&self) -> Result<MemoryStatistics> {
        let conn = self.lock()?;
        let count = |sql: &str, today: Option<&str>| -> Result<u64> {
            let n: i64 = match today {
                Some(day) => conn.query_row(sql, params![day], |r| r.get(0)),
                None => conn.query_row(sql, [], |r| r.get(0)),
            }
            .map_err(storage_err("count rows"))?;
            Ok(n.max(0) as u64)
        };

        let today = Utc::now().format("%Y-%m-%d").to_string();
        Ok(MemoryStatistics {
            total_conversations: count("SELECT COUNT(*) FROM conversations", None)?,
            total_snippets: count("SELECT COUNT(*) FROM code_snippets", None)?,
            total_projects: count("SELECT COUNT(*) FROM project_contexts", None)?,
            conversations_today: count(
                "SELECT COUNT(*) FROM conversations WHERE substr(timestamp, 1, 10) = ?1",
                Some(today.as_str()),
            )?,
        })
    }
}
