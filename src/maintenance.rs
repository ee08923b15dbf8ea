//! Housekeeping over the conversation store

use crate::error::Result;
use crate::storage::{ConversationStore, MemoryStatistics};
use std::sync::Arc;

/// Retention cleanup and statistics for the UI
pub struct MaintenanceOps {
    store: Arc<dyn ConversationStore>,
}

impl MaintenanceOps {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// Delete conversations older than `days_to_keep` days
    ///
    /// `0` deletes every conversation. Snippets and project contexts are
    /// never touched. Returns the number of deleted conversations.
    pub fn cleanup_old_conversations(&self, days_to_keep: u32) -> Result<usize> {
        let deleted = self.store.cleanup_old_conversations(days_to_keep)?;
        tracing::info!(
            "Cleanup removed {} conversations older than {} days",
            deleted,
            days_to_keep
        );
        Ok(deleted)
    }

    pub fn statistics(&self) -> Result<MemoryStatistics> {
        self.store.get_statistics()
    }

    /// Statistics rendered as the multi-line summary shown to users
    pub fn statistics_summary(&self) -> Result<String> {
        Ok(self.statistics()?.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryStore, NewCodeSnippet, NewConversation};

    #[test]
    fn test_cleanup_zero_days_keeps_snippets() {
        let store = Arc::new(InMemoryStore::new());
        store
            .add_conversation(NewConversation::new("a", "1"))
            .unwrap();
        store
            .add_conversation(NewConversation::new("b", "2"))
            .unwrap();
        store
            .save_code_snippet(NewCodeSnippet::new("hello", "print('hi')"))
            .unwrap();

        let ops = MaintenanceOps::new(store);
        assert_eq!(ops.cleanup_old_conversations(0).unwrap(), 2);

        let stats = ops.statistics().unwrap();
        assert_eq!(stats.total_conversations, 0);
        assert_eq!(stats.total_snippets, 1);
    }

    #[test]
    fn test_cleanup_keeps_recent() {
        let store = Arc::new(InMemoryStore::new());
        store
            .add_conversation(NewConversation::new("fresh", "x"))
            .unwrap();
        let ops = MaintenanceOps::new(store);
        assert_eq!(ops.cleanup_old_conversations(30).unwrap(), 0);
        assert_eq!(ops.statistics().unwrap().conversations_today, 1);
    }

    #[test]
    fn test_summary_mentions_counts() {
        let store = Arc::new(InMemoryStore::new());
        store
            .add_conversation(NewConversation::new("q", "a"))
            .unwrap();
        let summary = MaintenanceOps::new(store).statistics_summary().unwrap();
        assert!(summary.contains('1'));
    }
}
