//! Context composition
//!
//! Enriches a base system prompt with three optional sections, always in
//! this order:
//!
//! 1. the most recent exchanges, between [`CONTEXT_BEGIN`] and [`CONTEXT_END`]
//! 2. a stored project context under `PROJECT CONTEXT`
//! 3. prior exchanges similar to the current prompt under
//!    `SIMILAR PRIOR SOLUTIONS`
//!
//! Similarity is a keyword substring count over a recency-biased sample of
//! the history, not an index; it stays cheap next to the model call.

use crate::config::MemoryConfig;
use crate::error::Result;
use crate::storage::{ConversationRecord, ConversationStore};
use std::sync::Arc;

/// Opening delimiter of the recent-history block
pub const CONTEXT_BEGIN: &str = "=== CONVERSATION CONTEXT BEGIN ===";
/// Closing delimiter of the recent-history block
pub const CONTEXT_END: &str = "=== CONVERSATION CONTEXT END ===";

pub const PROJECT_CONTEXT_LABEL: &str = "PROJECT CONTEXT";
pub const SIMILAR_SOLUTIONS_LABEL: &str = "SIMILAR PRIOR SOLUTIONS";

const RECENT_PROMPT_CHARS: usize = 200;
const RECENT_CODE_CHARS: usize = 300;
const SIMILAR_PROMPT_CHARS: usize = 100;
const SIMILAR_CODE_CHARS: usize = 200;

/// A history entry together with its keyword score
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarConversation {
    pub record: ConversationRecord,
    pub score: usize,
}

/// Builds enriched system prompts from stored history
pub struct ContextComposer {
    store: Arc<dyn ConversationStore>,
    recent_count: usize,
    scan_window: usize,
    similar_limit: usize,
}

impl ContextComposer {
    /// Create a composer over `store` using the retrieval sizes in `config`
    pub fn new(store: Arc<dyn ConversationStore>, config: &MemoryConfig) -> Self {
        Self {
            store,
            recent_count: config.recent_context_count,
            scan_window: config.similar_scan_window,
            similar_limit: config.similar_limit,
        }
    }

    /// Render the `n` most recent exchanges in chronological order
    ///
    /// Returns an empty string when there is no history.
    pub fn build_recent_context(&self, n: usize) -> Result<String> {
        if n == 0 {
            return Ok(String::new());
        }

        let mut recent = self.store.get_recent_conversations(n, None)?;
        if recent.is_empty() {
            return Ok(String::new());
        }
        recent.reverse();

        let mut block = String::new();
        block.push_str(CONTEXT_BEGIN);
        block.push('\n');
        for (idx, record) in recent.iter().enumerate() {
            block.push_str(&format!(
                "[{}] User: {}\n    Code: {}\n    Model: {}\n",
                idx + 1,
                truncate_chars(&record.user_prompt, RECENT_PROMPT_CHARS),
                truncate_chars(&record.generated_code, RECENT_CODE_CHARS),
                record.model_used
            ));
        }
        block.push_str(CONTEXT_END);

        Ok(block)
    }

    /// Rank recent history by keyword overlap with `query`
    ///
    /// Only the newest `similar_scan_window` conversations are scanned.
    /// Each candidate scores the sum, over whitespace-separated lowercase
    /// keywords, of their occurrence counts in the lowercased prompt plus
    /// generated code. Zero scores are dropped; ties keep recency order.
    pub fn find_similar_conversations(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SimilarConversation>> {
        let lowered = query.to_lowercase();
        let keywords: Vec<&str> = lowered.split_whitespace().collect();
        if keywords.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let candidates = self.store.get_recent_conversations(self.scan_window, None)?;
        let mut scored: Vec<SimilarConversation> = candidates
            .into_iter()
            .filter_map(|record| {
                let haystack =
                    format!("{}{}", record.user_prompt, record.generated_code).to_lowercase();
                let score = keyword_score(&keywords, &haystack);
                (score > 0).then_some(SimilarConversation { record, score })
            })
            .collect();

        // `sort_by` is stable, so equal scores stay newest first.
        scored.sort_by(|a, b| b.score.cmp(&a.score));
        scored.truncate(limit);

        Ok(scored)
    }

    /// Assemble the system prompt sent with a generation request
    ///
    /// Store failures are logged and the affected section is left out; a
    /// missing project context is not an error.
    pub fn compose_enhanced_system_prompt(
        &self,
        base_prompt: &str,
        use_context: bool,
        project_context: Option<&str>,
        user_prompt: &str,
    ) -> String {
        let mut prompt = base_prompt.to_string();

        if use_context {
            match self.build_recent_context(self.recent_count) {
                Ok(block) => append_section(&mut prompt, &block),
                Err(e) => tracing::warn!("Skipping recent context: {}", e),
            }
        }

        if let Some(name) = project_context {
            match self.store.get_project_context(name) {
                Ok(Some(data)) if !data.is_empty() => {
                    match serde_json::to_string_pretty(&data) {
                        Ok(rendered) => append_section(
                            &mut prompt,
                            &format!("{} ({}):\n{}", PROJECT_CONTEXT_LABEL, name, rendered),
                        ),
                        Err(e) => tracing::warn!("Cannot render project context {}: {}", name, e),
                    }
                }
                Ok(_) => tracing::debug!("No project context stored for '{}'", name),
                Err(e) => tracing::warn!("Skipping project context {}: {}", name, e),
            }
        }

        match self.find_similar_conversations(user_prompt, self.similar_limit) {
            Ok(similar) if !similar.is_empty() => {
                append_section(&mut prompt, &render_similar(&similar));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Skipping similar conversations: {}", e),
        }

        prompt
    }
}

fn append_section(prompt: &mut String, section: &str) {
    if section.is_empty() {
        return;
    }
    if !prompt.is_empty() {
        prompt.push_str("\n\n");
    }
    prompt.push_str(section);
}

fn render_similar(similar: &[SimilarConversation]) -> String {
    let mut section = format!("{}:", SIMILAR_SOLUTIONS_LABEL);
    for (idx, entry) in similar.iter().enumerate() {
        section.push_str(&format!(
            "\n{}. Prompt: {}\n   Code: {}",
            idx + 1,
            truncate_chars(&entry.record.user_prompt, SIMILAR_PROMPT_CHARS),
            truncate_chars(&entry.record.generated_code, SIMILAR_CODE_CHARS)
        ));
    }
    section
}

/// Sum of non-overlapping occurrence counts of each keyword in `haystack`
///
/// # Examples
///
/// ```
/// use aidroid::context::keyword_score;
///
/// assert_eq!(keyword_score(&["ab", "c"], "abab c"), 3);
/// assert_eq!(keyword_score(&["zz"], "abab c"), 0);
/// ```
pub fn keyword_score(keywords: &[&str], haystack: &str) -> usize {
    keywords
        .iter()
        .map(|kw| haystack.matches(kw).count())
        .sum()
}

/// First `max` characters of `text`, with `...` appended when cut
///
/// # Examples
///
/// ```
/// use aidroid::context::truncate_chars;
///
/// assert_eq!(truncate_chars("hello", 10), "hello");
/// assert_eq!(truncate_chars("hello", 3), "hel...");
/// ```
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryStore, NewConversation};
    use serde_json::json;

    fn composer_with(records: &[(&str, &str)]) -> (ContextComposer, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        for (prompt, code) in records {
            store
                .add_conversation(NewConversation::new(*prompt, *code).with_model("test-model"))
                .unwrap();
        }
        let composer = ContextComposer::new(store.clone(), &MemoryConfig::default());
        (composer, store)
    }

    #[test]
    fn test_recent_context_empty_history() {
        let (composer, _) = composer_with(&[]);
        assert_eq!(composer.build_recent_context(3).unwrap(), "");
    }

    #[test]
    fn test_recent_context_is_chronological_and_delimited() {
        let (composer, _) = composer_with(&[("first", "a"), ("second", "b"), ("third", "c")]);
        let block = composer.build_recent_context(2).unwrap();

        assert!(block.starts_with(CONTEXT_BEGIN));
        assert!(block.ends_with(CONTEXT_END));
        assert!(!block.contains("first"));
        let second = block.find("second").unwrap();
        let third = block.find("third").unwrap();
        assert!(second < third);
        assert!(block.contains("Model: test-model"));
    }

    #[test]
    fn test_recent_context_truncates_prompt_and_code() {
        let long_prompt = "p".repeat(250);
        let long_code = "c".repeat(400);
        let (composer, _) = composer_with(&[(long_prompt.as_str(), long_code.as_str())]);
        let block = composer.build_recent_context(1).unwrap();

        assert!(block.contains(&format!("User: {}...", "p".repeat(200))));
        assert!(!block.contains(&"p".repeat(201)));
        assert!(block.contains(&format!("Code: {}...", "c".repeat(300))));
        assert!(!block.contains(&"c".repeat(301)));
    }

    #[test]
    fn test_similar_ranks_by_total_occurrences() {
        let (composer, _) = composer_with(&[
            ("samsung s25 camera", "samsung samsung"),
            ("weather app", "fetch()"),
            ("s25 battery", "x"),
        ]);
        let similar = composer
            .find_similar_conversations("Samsung S25", 5)
            .unwrap();

        assert_eq!(similar.len(), 2);
        assert_eq!(similar[0].record.user_prompt, "samsung s25 camera");
        assert_eq!(similar[0].score, 4);
        assert_eq!(similar[1].record.user_prompt, "s25 battery");
        assert_eq!(similar[1].score, 1);
    }

    #[test]
    fn test_similar_scores_prompt_and_code_joined() {
        let (composer, _) = composer_with(&[("build a tok", "enizer()"), ("tok", " enizer")]);
        let similar = composer.find_similar_conversations("tokenizer", 5).unwrap();

        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].record.user_prompt, "build a tok");
        assert_eq!(similar[0].score, 1);
    }

    #[test]
    fn test_similar_ties_keep_recency_order() {
        let (composer, _) = composer_with(&[("parser one", ""), ("parser two", "")]);
        let similar = composer.find_similar_conversations("parser", 5).unwrap();
        assert_eq!(similar[0].record.user_prompt, "parser two");
        assert_eq!(similar[1].record.user_prompt, "parser one");
    }

    #[test]
    fn test_similar_only_scans_recent_window() {
        let store = Arc::new(InMemoryStore::new());
        store
            .add_conversation(NewConversation::new("needle", ""))
            .unwrap();
        for i in 0..3 {
            store
                .add_conversation(NewConversation::new(format!("hay {}", i), ""))
                .unwrap();
        }
        let config = MemoryConfig {
            similar_scan_window: 3,
            ..MemoryConfig::default()
        };
        let composer = ContextComposer::new(store, &config);
        assert!(composer
            .find_similar_conversations("needle", 5)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_similar_empty_query_returns_nothing() {
        let (composer, _) = composer_with(&[("anything", "")]);
        assert!(composer
            .find_similar_conversations("   ", 5)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_compose_with_context_contains_prompt_between_markers() {
        let (composer, _) = composer_with(&[("build a parser", "fn parse() {}")]);
        let prompt =
            composer.compose_enhanced_system_prompt("You are helpful.", true, None, "hello");

        let begin = prompt.find(CONTEXT_BEGIN).unwrap();
        let end = prompt.find(CONTEXT_END).unwrap();
        let inside = &prompt[begin..end];
        assert!(inside.contains("build a parser"));
        assert!(prompt.starts_with("You are helpful."));
    }

    #[test]
    fn test_compose_without_history_has_no_empty_headers() {
        let (composer, _) = composer_with(&[]);
        let prompt =
            composer.compose_enhanced_system_prompt("Base", true, Some("missing"), "anything");
        assert_eq!(prompt, "Base");
    }

    #[test]
    fn test_compose_section_order() {
        let (composer, store) = composer_with(&[("tokenizer in rust", "struct Lexer;")]);
        store
            .save_project_context(
                "lexer",
                json!({"language": "rust"}).as_object().unwrap(),
            )
            .unwrap();

        let prompt = composer.compose_enhanced_system_prompt(
            "Base",
            true,
            Some("lexer"),
            "rust tokenizer",
        );

        let recent = prompt.find(CONTEXT_BEGIN).unwrap();
        let project = prompt.find(PROJECT_CONTEXT_LABEL).unwrap();
        let similar = prompt.find(SIMILAR_SOLUTIONS_LABEL).unwrap();
        assert!(recent < project && project < similar);
        assert!(prompt.contains("\"language\": \"rust\""));
    }

    #[test]
    fn test_compose_without_context_skips_recent_block() {
        let (composer, _) = composer_with(&[("unrelated", "x")]);
        let prompt = composer.compose_enhanced_system_prompt("Base", false, None, "query");
        assert!(!prompt.contains(CONTEXT_BEGIN));
        assert_eq!(prompt, "Base");
    }

    #[test]
    fn test_similar_section_limited_and_truncated() {
        let long = format!("parser {}", "x".repeat(150));
        let (composer, _) = composer_with(&[(long.as_str(), "a"), ("parser b", "b"), ("parser c", "c")]);
        let prompt = composer.compose_enhanced_system_prompt("Base", false, None, "parser");

        let section = &prompt[prompt.find(SIMILAR_SOLUTIONS_LABEL).unwrap()..];
        assert!(section.contains("1. Prompt: parser c"));
        assert!(section.contains("2. Prompt: parser b"));
        assert!(!section.contains("3. Prompt"));
    }

    #[test]
    fn test_truncate_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("äöü", 2), "äö...");
        assert_eq!(truncate_chars("äöü", 3), "äöü");
    }
}
