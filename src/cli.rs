//! Command-line interface definition for aiDroid
//!
//! This module defines the CLI structure using clap's derive API: code
//! generation with conversation memory, history inspection, project
//! contexts, snippets, and maintenance.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// aiDroid - code generation with conversation memory
///
/// Streams completions from OpenRouter and feeds prior exchanges back
/// into the system prompt.
#[derive(Parser, Debug, Clone)]
#[command(name = "aidroid")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the conversation database location
    #[arg(long, env = "AIDROID_MEMORY_DB")]
    pub storage_path: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for aiDroid
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Generate code for a single prompt
    Generate {
        /// Prompt to send
        #[arg(short, long)]
        prompt: String,

        /// Override the configured model
        #[arg(short, long)]
        model: Option<String>,

        /// Override the configured base system prompt
        #[arg(short, long)]
        system: Option<String>,

        /// Project whose stored context is added to the prompt
        #[arg(long)]
        project: Option<String>,

        /// Do not add recent history to the prompt
        #[arg(long)]
        no_context: bool,

        /// Do not store the exchange
        #[arg(long)]
        no_save: bool,

        /// Wait for the full response instead of streaming
        #[arg(long)]
        once: bool,
    },

    /// Interactive generation loop
    Chat {
        /// Override the configured model
        #[arg(short, long)]
        model: Option<String>,

        /// Project whose stored context is added to each prompt
        #[arg(long)]
        project: Option<String>,
    },

    /// Show recent conversations
    History {
        /// Number of conversations to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Only show conversations for this project
        #[arg(long)]
        project: Option<String>,
    },

    /// Find past conversations similar to a query
    Similar {
        /// Free-text query
        query: String,

        /// Maximum number of matches
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },

    /// Show memory statistics
    Stats,

    /// Delete old conversations
    Cleanup {
        /// Days of history to keep (0 deletes everything); defaults to
        /// `memory.retention_days`
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Manage project contexts
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },

    /// Manage reusable code snippets
    Snippet {
        #[command(subcommand)]
        command: SnippetCommand,
    },

    /// List models available on OpenRouter
    Models {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or clear the response cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

/// Project context subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ProjectCommand {
    /// Store a JSON object as the context of a project
    Set {
        /// Project name
        name: String,

        /// JSON object, e.g. '{"language":"rust"}'
        json: String,
    },

    /// Print the stored context of a project
    Show {
        /// Project name
        name: String,
    },
}

/// Snippet subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SnippetCommand {
    /// Save a snippet from a file or inline code
    Add {
        #[arg(short, long)]
        name: String,

        /// Read code from this file
        #[arg(short, long, conflicts_with = "code")]
        file: Option<PathBuf>,

        /// Inline code
        #[arg(long)]
        code: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        /// Language label (default: python)
        #[arg(short, long)]
        language: Option<String>,

        /// Tag; may be repeated
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },

    /// List snippets, most used first
    List {
        #[arg(short, long)]
        language: Option<String>,

        /// Substring match against the tag list
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// Print a snippet's code and count the use
    Use {
        /// Snippet id
        id: i64,
    },
}

/// Response cache subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommand {
    /// Show cache location and size
    Info,
    /// Delete all cached responses
    Clear,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_generate_defaults() {
        let cli = Cli::try_parse_from(["aidroid", "generate", "--prompt", "write a lexer"]).unwrap();
        assert_eq!(cli.config, Some("config/config.yaml".to_string()));
        if let Commands::Generate {
            prompt,
            model,
            no_context,
            no_save,
            once,
            ..
        } = cli.command
        {
            assert_eq!(prompt, "write a lexer");
            assert!(model.is_none());
            assert!(!no_context && !no_save && !once);
        } else {
            panic!("Expected Generate command");
        }
    }

    #[test]
    fn test_cli_parse_generate_flags() {
        let cli = Cli::try_parse_from([
            "aidroid",
            "generate",
            "-p",
            "hi",
            "--model",
            "anthropic/claude-3-haiku",
            "--project",
            "demo",
            "--no-context",
            "--no-save",
            "--once",
        ])
        .unwrap();
        if let Commands::Generate {
            model,
            project,
            no_context,
            no_save,
            once,
            ..
        } = cli.command
        {
            assert_eq!(model.as_deref(), Some("anthropic/claude-3-haiku"));
            assert_eq!(project.as_deref(), Some("demo"));
            assert!(no_context && no_save && once);
        } else {
            panic!("Expected Generate command");
        }
    }

    #[test]
    fn test_cli_generate_requires_prompt() {
        assert!(Cli::try_parse_from(["aidroid", "generate"]).is_err());
    }

    #[test]
    fn test_cli_parse_cleanup_days() {
        let cli = Cli::try_parse_from(["aidroid", "cleanup", "--days", "0"]).unwrap();
        assert!(matches!(cli.command, Commands::Cleanup { days: Some(0) }));
    }

    #[test]
    fn test_cli_parse_storage_path() {
        let cli =
            Cli::try_parse_from(["aidroid", "--storage-path", "/tmp/mem.db", "stats"]).unwrap();
        assert_eq!(cli.storage_path.as_deref(), Some("/tmp/mem.db"));
        assert!(matches!(cli.command, Commands::Stats));
    }

    #[test]
    fn test_cli_parse_snippet_add_with_tags() {
        let cli = Cli::try_parse_from([
            "aidroid", "snippet", "add", "--name", "fib", "--code", "def fib(): ...", "-t", "math",
            "-t", "recursion",
        ])
        .unwrap();
        match cli.command {
            Commands::Snippet {
                command: SnippetCommand::Add { name, code, tags, .. },
            } => {
                assert_eq!(name, "fib");
                assert_eq!(code.as_deref(), Some("def fib(): ..."));
                assert_eq!(tags, vec!["math", "recursion"]);
            }
            other => panic!("Expected snippet add, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_snippet_file_conflicts_with_code() {
        let result = Cli::try_parse_from([
            "aidroid", "snippet", "add", "--name", "x", "--code", "y", "--file", "z.py",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parse_project_set() {
        let cli =
            Cli::try_parse_from(["aidroid", "project", "set", "demo", r#"{"a":1}"#]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Project {
                command: ProjectCommand::Set { .. }
            }
        ));
    }

    #[test]
    fn test_cli_parse_similar() {
        let cli = Cli::try_parse_from(["aidroid", "similar", "samsung s25"]).unwrap();
        if let Commands::Similar { query, limit } = cli.command {
            assert_eq!(query, "samsung s25");
            assert_eq!(limit, 5);
        } else {
            panic!("Expected Similar command");
        }
    }

    #[test]
    fn test_cli_parse_cache_clear() {
        let cli = Cli::try_parse_from(["aidroid", "cache", "clear"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cache {
                command: CacheCommand::Clear
            }
        ));
    }
}
