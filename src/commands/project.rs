//! Project context and snippet commands

use crate::cli::{ProjectCommand, SnippetCommand};
use crate::commands::{one_line, open_store};
use crate::config::Config;
use crate::error::{AidroidError, Result};
use crate::storage::{ContextData, ConversationStore, NewCodeSnippet};
use colored::Colorize;
use prettytable::{format, Table};

/// Parse a JSON object for `project set`
pub fn parse_context_json(raw: &str) -> Result<ContextData> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| AidroidError::Validation(format!("Invalid project context JSON: {}", e)))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(AidroidError::Validation("Project context must be a JSON object".to_string()).into()),
    }
}

pub fn handle_project(config: &Config, command: ProjectCommand) -> Result<()> {
    let store = open_store(config)?;

    match command {
        ProjectCommand::Set { name, json } => {
            let data = parse_context_json(&json)?;
            store.save_project_context(&name, &data)?;
            println!("{}", format!("Saved context for project '{}'", name).green());
        }
        ProjectCommand::Show { name } => match store.get_project_context(&name)? {
            Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
            None => println!("{}", format!("No context stored for project '{}'", name).yellow()),
        },
    }

    Ok(())
}

pub fn handle_snippet(config: &Config, command: SnippetCommand) -> Result<()> {
    let store = open_store(config)?;

    match command {
        SnippetCommand::Add {
            name,
            file,
            code,
            description,
            language,
            tags,
        } => {
            let code = match (file, code) {
                (Some(path), _) => std::fs::read_to_string(&path).map_err(AidroidError::from)?,
                (None, Some(code)) => code,
                (None, None) => {
                    return Err(AidroidError::Validation(
                        "Either --file or --code is required".to_string(),
                    )
                    .into())
                }
            };

            let mut snippet = NewCodeSnippet::new(name.clone(), code).with_tags(tags);
            if let Some(description) = description {
                snippet = snippet.with_description(description);
            }
            if let Some(language) = language {
                snippet = snippet.with_language(language);
            }

            let id = store.save_code_snippet(snippet)?;
            println!("{}", format!("Saved snippet '{}' as #{}", name, id).green());
        }
        SnippetCommand::List { language, tag } => {
            let snippets = store.get_code_snippets(language.as_deref(), tag.as_deref())?;
            if snippets.is_empty() {
                println!("{}", "No snippets found.".yellow());
                return Ok(());
            }

            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
            table.add_row(prettytable::row![
                "ID".bold(),
                "Name".bold(),
                "Language".bold(),
                "Uses".bold(),
                "Tags".bold(),
                "Description".bold()
            ]);
            for snippet in snippets {
                table.add_row(prettytable::row![
                    snippet.id.to_string().cyan(),
                    snippet.name,
                    snippet.language,
                    snippet.used_count,
                    snippet.tags.join(", "),
                    one_line(&snippet.description, 40)
                ]);
            }
            table.printstd();
        }
        SnippetCommand::Use { id } => {
            let snippet = store.get_code_snippet(id)?.ok_or_else(|| {
                AidroidError::Validation(format!("Snippet #{} does not exist", id))
            })?;
            store.increment_snippet_usage(id)?;
            println!("{}", snippet.code);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_kind;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.memory.db_path = Some(dir.path().join("mem.db"));
        config
    }

    #[test]
    fn test_parse_context_json_requires_object() {
        assert!(parse_context_json(r#"{"language":"rust"}"#).is_ok());
        let err = parse_context_json("[1,2]").unwrap_err();
        assert_eq!(error_kind(&err), "validation");
        assert!(parse_context_json("{oops").is_err());
    }

    #[test]
    fn test_project_set_then_show() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        handle_project(
            &config,
            ProjectCommand::Set {
                name: "demo".to_string(),
                json: r#"{"framework":"axum"}"#.to_string(),
            },
        )
        .unwrap();

        let stored = open_store(&config)
            .unwrap()
            .get_project_context("demo")
            .unwrap()
            .unwrap();
        assert_eq!(stored["framework"], "axum");
    }

    #[test]
    fn test_snippet_add_and_use_counts() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        handle_snippet(
            &config,
            SnippetCommand::Add {
                name: "hello".to_string(),
                file: None,
                code: Some("print('hi')".to_string()),
                description: None,
                language: None,
                tags: vec!["greeting".to_string()],
            },
        )
        .unwrap();

        let store = open_store(&config).unwrap();
        let snippets = store.get_code_snippets(None, Some("greet")).unwrap();
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].language, "python");
        let id = snippets[0].id;
        drop(store);

        handle_snippet(&config, SnippetCommand::Use { id }).unwrap();
        let store = open_store(&config).unwrap();
        assert_eq!(store.get_code_snippet(id).unwrap().unwrap().used_count, 1);
    }

    #[test]
    fn test_snippet_add_requires_source() {
        let dir = TempDir::new().unwrap();
        let err = handle_snippet(
            &config_in(&dir),
            SnippetCommand::Add {
                name: "empty".to_string(),
                file: None,
                code: None,
                description: None,
                language: None,
                tags: Vec::new(),
            },
        )
        .unwrap_err();
        assert_eq!(error_kind(&err), "validation");
    }

    #[test]
    fn test_snippet_use_missing_id() {
        let dir = TempDir::new().unwrap();
        assert!(handle_snippet(&config_in(&dir), SnippetCommand::Use { id: 99 }).is_err());
    }
}
