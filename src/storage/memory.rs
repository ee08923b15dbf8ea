//! Volatile conversation store
//!
//! Same contract as [`SqliteStore`](super::SqliteStore) over plain vectors;
//! used by tests and by sessions that should not touch disk.

use super::types::{
    code_fingerprint, retention_cutoff, session_bucket, CodeSnippet, ContextData,
    ConversationRecord, MemoryStatistics, NewCodeSnippet, NewConversation, ProjectContext,
};
use super::{encode_tags, ConversationStore};
use crate::error::{AidroidError, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Tables {
    conversations: Vec<ConversationRecord>,
    projects: BTreeMap<String, ProjectContext>,
    snippets: Vec<CodeSnippet>,
    next_conversation_id: i64,
    next_snippet_id: i64,
}

/// In-process conversation store
///
/// # Examples
///
/// ```
/// use aidroid::storage::{ConversationStore, InMemoryStore, NewConversation};
///
/// let store = InMemoryStore::new();
/// store.add_conversation(NewConversation::new("hi", "print(1)")).unwrap();
/// assert_eq!(store.get_statistics().unwrap().total_conversations, 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| AidroidError::Storage("In-memory store poisoned".to_string()).into())
    }
}

/// Newest first; ties broken by the higher id
fn by_recency(a: &ConversationRecord, b: &ConversationRecord) -> std::cmp::Ordering {
    b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id))
}

impl ConversationStore for InMemoryStore {
    fn add_conversation(&self, new: NewConversation) -> Result<i64> {
        new.validate()?;
        let mut tables = self.lock()?;
        let now = Utc::now();
        tables.next_conversation_id += 1;
        let id = tables.next_conversation_id;
        tables.conversations.push(ConversationRecord {
            id,
            session_id: session_bucket(now),
            timestamp: now,
            code_hash: code_fingerprint(&new.generated_code),
            user_prompt: new.user_prompt,
            system_prompt: new.system_prompt,
            model_used: new.model_used,
            generated_code: new.generated_code,
            project_context: new.project_context,
            tags: new.tags,
        });
        Ok(id)
    }

    fn get_recent_conversations(
        &self,
        limit: usize,
        project_context: Option<&str>,
    ) -> Result<Vec<ConversationRecord>> {
        let tables = self.lock()?;
        let mut records: Vec<ConversationRecord> = tables
            .conversations
            .iter()
            .filter(|r| match project_context {
                Some(project) => r.project_context.as_deref() == Some(project),
                None => true,
            })
            .cloned()
            .collect();
        records.sort_by(by_recency);
        records.truncate(limit);
        Ok(records)
    }

    fn find_by_code_hash(&self, code_hash: &str) -> Result<Option<ConversationRecord>> {
        let tables = self.lock()?;
        Ok(tables
            .conversations
            .iter()
            .filter(|r| r.code_hash == code_hash)
            .min_by(|a, b| by_recency(a, b))
            .cloned())
    }

    fn save_project_context(&self, name: &str, context_data: &ContextData) -> Result<()> {
        let mut tables = self.lock()?;
        tables.projects.insert(
            name.to_string(),
            ProjectContext {
                project_name: name.to_string(),
                context_data: context_data.clone(),
                last_updated: Utc::now(),
            },
        );
        Ok(())
    }

    fn get_project_context(&self, name: &str) -> Result<Option<ContextData>> {
        let tables = self.lock()?;
        Ok(tables.projects.get(name).map(|p| p.context_data.clone()))
    }

    fn save_code_snippet(&self, snippet: NewCodeSnippet) -> Result<i64> {
        let mut tables = self.lock()?;
        tables.next_snippet_id += 1;
        let id = tables.next_snippet_id;
        tables.snippets.push(CodeSnippet {
            id,
            name: snippet.name,
            code: snippet.code,
            description: snippet.description,
            language: snippet.language,
            tags: snippet.tags,
            created_at: Utc::now(),
            used_count: 0,
        });
        Ok(id)
    }

    fn get_code_snippet(&self, id: i64) -> Result<Option<CodeSnippet>> {
        let tables = self.lock()?;
        Ok(tables.snippets.iter().find(|s| s.id == id).cloned())
    }

    fn get_code_snippets(
        &self,
        language: Option<&str>,
        tag: Option<&str>,
    ) -> Result<Vec<CodeSnippet>> {
        let tables = self.lock()?;
        let mut snippets = Vec::new();
        for snippet in &tables.snippets {
            if language.is_some_and(|l| l != snippet.language) {
                continue;
            }
            if let Some(tag) = tag {
                // Same loose containment test the SQL backend applies.
                if !encode_tags(&snippet.tags)?.contains(tag) {
                    continue;
                }
            }
            snippets.push(snippet.clone());
        }
        snippets.sort_by(|a, b| {
            b.used_count
                .cmp(&a.used_count)
                .then(b.created_at.cmp(&a.created_at))
                .then(b.id.cmp(&a.id))
        });
        Ok(snippets)
    }

    fn increment_snippet_usage(&self, id: i64) -> Result<()> {
        let mut tables = self.lock()?;
        match tables.snippets.iter_mut().find(|s| s.id == id) {
            Some(snippet) => {
                snippet.used_count += 1;
                Ok(())
            }
            None => Err(AidroidError::Storage(format!("No code snippet with id {}", id)).into()),
        }
    }

    fn cleanup_old_conversations(&self, days_to_keep: u32) -> Result<usize> {
        let cutoff = retention_cutoff(Utc::now(), days_to_keep);
        let mut tables = self.lock()?;
        let before = tables.conversations.len();
        match cutoff {
            _ if days_to_keep == 0 => tables.conversations.clear(),
            Some(cutoff) => tables.conversations.retain(|r| r.timestamp >= cutoff),
            None => {}
        }
        Ok(before - tables.conversations.len())
    }

    fn get_statistics(&self) -> Result<MemoryStatistics> {
        let tables = self.lock()?;
        let today = Utc::now().date_naive();
        Ok(MemoryStatistics {
            total_conversations: tables.conversations.len() as u64,
            total_snippets: tables.snippets.len() as u64,
            total_projects: tables.projects.len() as u64,
            conversations_today: tables
                .conversations
                .iter()
                .filter(|r| r.timestamp.date_naive() == today)
                .count() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn backdate(store: &InMemoryStore, id: i64, days: i64) {
        let mut tables = store.lock().unwrap();
        let record = tables
            .conversations
            .iter_mut()
            .find(|r| r.id == id)
            .unwrap();
        record.timestamp = Utc::now() - Duration::days(days);
    }

    #[test]
    fn test_ids_increase_and_recent_is_first() {
        let store = InMemoryStore::new();
        let a = store.add_conversation(NewConversation::new("a", "")).unwrap();
        let b = store.add_conversation(NewConversation::new("b", "")).unwrap();
        assert!(b > a);
        let recent = store.get_recent_conversations(1, None).unwrap();
        assert_eq!(recent[0].id, b);
    }

    #[test]
    fn test_project_filter() {
        let store = InMemoryStore::new();
        store
            .add_conversation(NewConversation::new("a", "").with_project("X"))
            .unwrap();
        store.add_conversation(NewConversation::new("b", "")).unwrap();
        let filtered = store.get_recent_conversations(10, Some("X")).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].user_prompt, "a");
    }

    #[test]
    fn test_returned_records_are_copies() {
        let store = InMemoryStore::new();
        store
            .add_conversation(NewConversation::new("original", ""))
            .unwrap();
        let mut copy = store.get_recent_conversations(1, None).unwrap();
        copy[0].user_prompt = "mutated".to_string();
        assert_eq!(
            store.get_recent_conversations(1, None).unwrap()[0].user_prompt,
            "original"
        );
    }

    #[test]
    fn test_project_context_roundtrip() {
        let store = InMemoryStore::new();
        let data = json!({"a": 1}).as_object().cloned().unwrap();
        store.save_project_context("p1", &data).unwrap();
        assert_eq!(store.get_project_context("p1").unwrap(), Some(data));
    }

    #[test]
    fn test_snippet_tag_filter_is_loose() {
        let store = InMemoryStore::new();
        let id = store
            .save_code_snippet(NewCodeSnippet::new("s", "x").with_tags(["database"]))
            .unwrap();
        store.save_code_snippet(NewCodeSnippet::new("t", "y")).unwrap();
        let found = store.get_code_snippets(None, Some("data")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);
    }

    #[test]
    fn test_cleanup_and_today_statistics() {
        let store = InMemoryStore::new();
        let old = store.add_conversation(NewConversation::new("old", "")).unwrap();
        store.add_conversation(NewConversation::new("new", "")).unwrap();
        backdate(&store, old, 10);

        let stats = store.get_statistics().unwrap();
        assert_eq!(stats.total_conversations, 2);
        assert_eq!(stats.conversations_today, 1);

        assert_eq!(store.cleanup_old_conversations(5).unwrap(), 1);
        assert_eq!(store.cleanup_old_conversations(0).unwrap(), 1);
        assert_eq!(store.get_statistics().unwrap().total_conversations, 0);
    }

    #[test]
    fn test_empty_user_prompt_rejected() {
        let store = InMemoryStore::new();
        let err = store
            .add_conversation(NewConversation::new("  ", "code"))
            .unwrap_err();
        assert_eq!(crate::error::error_kind(&err), "validation");
        assert_eq!(store.get_statistics().unwrap().total_conversations, 0);
    }

    #[test]
    fn test_cleanup_with_huge_retention_keeps_everything() {
        let store = InMemoryStore::new();
        let old = store.add_conversation(NewConversation::new("old", "")).unwrap();
        store.add_conversation(NewConversation::new("new", "")).unwrap();
        backdate(&store, old, 365);

        assert_eq!(store.cleanup_old_conversations(200_000_000).unwrap(), 0);
        assert_eq!(store.cleanup_old_conversations(u32::MAX).unwrap(), 0);
        assert_eq!(store.get_statistics().unwrap().total_conversations, 2);
    }

    #[test]
    fn test_timestamps_follow_insertion_order() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        store
                            .add_conversation(NewConversation::new(format!("t{} p{}", t, i), ""))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let tables = store.lock().unwrap();
        let mut by_id: Vec<_> = tables.conversations.iter().collect();
        by_id.sort_by_key(|r| r.id);
        assert!(by_id.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }
}
