use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Structured document attached to a project (last write wins)
pub type ContextData = serde_json::Map<String, serde_json::Value>;

/// A persisted prompt/response exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Store-assigned, monotonically increasing identifier
    pub id: i64,
    /// Day bucket (`YYYYMMDD`) the exchange belongs to
    pub session_id: String,
    /// When the record was created
    pub timestamp: DateTime<Utc>,
    pub user_prompt: String,
    pub system_prompt: String,
    pub model_used: String,
    pub generated_code: String,
    /// Fingerprint of `generated_code`, see [`code_fingerprint`]
    pub code_hash: String,
    /// Optional label of a [`ProjectContext`]; not enforced as a foreign key
    pub project_context: Option<String>,
    pub tags: Vec<String>,
}

/// Input for [`ConversationStore::add_conversation`](super::ConversationStore::add_conversation)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewConversation {
    pub user_prompt: String,
    pub generated_code: String,
    pub system_prompt: String,
    pub model_used: String,
    pub project_context: Option<String>,
    pub tags: Vec<String>,
}

impl NewConversation {
    /// Reject exchanges without a user prompt
    pub(crate) fn validate(&self) -> crate::error::Result<()> {
        if self.user_prompt.trim().is_empty() {
            return Err(crate::error::AidroidError::Validation(
                "Conversation user prompt cannot be empty".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Creates an exchange with empty system prompt, model and tags
    ///
    /// # Examples
    ///
    /// ```
    /// use aidroid::storage::NewConversation;
    ///
    /// let new = NewConversation::new("build a parser", "fn parse() {}")
    ///     .with_model("openai/gpt-4o-mini")
    ///     .with_tags(["parser"]);
    /// assert_eq!(new.tags, vec!["parser".to_string()]);
    /// ```
    pub fn new(user_prompt: impl Into<String>, generated_code: impl Into<String>) -> Self {
        Self {
            user_prompt: user_prompt.into(),
            generated_code: generated_code.into(),
            ..Self::default()
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_used = model.into();
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project_context = Some(project.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Named structured context that can be injected into prompts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub project_name: String,
    pub context_data: ContextData,
    pub last_updated: DateTime<Utc>,
}

/// A reusable block of code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeSnippet {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub description: String,
    pub language: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Incremented each time the snippet is reused
    pub used_count: u64,
}

/// Input for [`ConversationStore::save_code_snippet`](super::ConversationStore::save_code_snippet)
#[derive(Debug, Clone, PartialEq)]
pub struct NewCodeSnippet {
    pub name: String,
    pub code: String,
    pub description: String,
    pub language: String,
    pub tags: Vec<String>,
}

impl NewCodeSnippet {
    /// Creates a snippet with the default language (`python`)
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            description: String::new(),
            language: DEFAULT_SNIPPET_LANGUAGE.to_string(),
            tags: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Language assigned to snippets when none is given
pub const DEFAULT_SNIPPET_LANGUAGE: &str = "python";

/// Aggregate counts over the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStatistics {
    pub total_conversations: u64,
    pub total_snippets: u64,
    pub total_projects: u64,
    /// Conversations whose UTC date equals the current UTC date
    pub conversations_today: u64,
}

impl std::fmt::Display for MemoryStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Conversations: {}", self.total_conversations)?;
        writeln!(f, "Today:         {}", self.conversations_today)?;
        writeln!(f, "Projects:      {}", self.total_projects)?;
        write!(f, "Snippets:      {}", self.total_snippets)
    }
}

/// Number of hex digits kept from the SHA-256 digest
const FINGERPRINT_LEN: usize = 16;

/// Short content fingerprint used to identify generated code blocks
///
/// # Examples
///
/// ```
/// use aidroid::storage::code_fingerprint;
///
/// let a = code_fingerprint("fn main() {}");
/// assert_eq!(a.len(), 16);
/// assert_eq!(a, code_fingerprint("fn main() {}"));
/// assert_ne!(a, code_fingerprint("fn main() { }"));
/// ```
pub fn code_fingerprint(code: &str) -> String {
    let digest = Sha256::digest(code.as_bytes());
    let mut hex = String::with_capacity(FINGERPRINT_LEN);
    for byte in digest.iter().take(FINGERPRINT_LEN / 2) {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

/// Day bucket for the given instant
pub fn session_bucket(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d").to_string()
}

/// Oldest timestamp kept by a retention window of `days_to_keep` days
///
/// `None` when the cutoff falls before the earliest representable instant,
/// in which case every record is inside the window.
pub(crate) fn retention_cutoff(now: DateTime<Utc>, days_to_keep: u32) -> Option<DateTime<Utc>> {
    now.checked_sub_signed(chrono::Duration::days(i64::from(days_to_keep)))
}

/// Fixed-precision RFC 3339 rendering; lexical order equals chronological order
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            tracing::warn!("Unparsable timestamp in store: {}", raw);
            DateTime::<Utc>::UNIX_EPOCH
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fingerprint_is_hex_prefix_of_sha256() {
        let fp = code_fingerprint("");
        // sha256("") = e3b0c442...
        assert_eq!(fp, "e3b0c44298fc1c14");
    }

    #[test]
    fn test_session_bucket_uses_calendar_date() {
        let at = Utc.with_ymd_and_hms(2025, 3, 7, 23, 59, 0).unwrap();
        assert_eq!(session_bucket(at), "20250307");
    }

    #[test]
    fn test_timestamp_format_roundtrip_and_ordering() {
        let early = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let late = early + chrono::Duration::microseconds(5);
        let (a, b) = (format_timestamp(early), format_timestamp(late));
        assert!(a < b);
        assert_eq!(parse_timestamp(&a), early);
    }

    #[test]
    fn test_new_snippet_defaults_to_python() {
        let snippet = NewCodeSnippet::new("hello", "print('hi')");
        assert_eq!(snippet.language, "python");
        assert!(snippet.tags.is_empty());
    }

    #[test]
    fn test_statistics_display() {
        let stats = MemoryStatistics {
            total_conversations: 4,
            total_snippets: 1,
            total_projects: 2,
            conversations_today: 3,
        };
        let text = stats.to_string();
        assert!(text.contains("Conversations: 4"));
        assert!(text.contains("Today:         3"));
    }
}
