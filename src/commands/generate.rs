//! `aidroid generate`

use crate::commands::{build_session, open_store};
use crate::config::Config;
use crate::error::Result;
use crate::generation::{GenerateRequest, GenerationSession, GenerationState};
use colored::Colorize;
use std::io::Write;

/// Options of one `generate` invocation
#[derive(Debug, Clone, Default)]
pub struct GenerateArgs {
    pub prompt: String,
    pub model: Option<String>,
    pub system: Option<String>,
    pub project: Option<String>,
    pub no_context: bool,
    pub no_save: bool,
    pub once: bool,
}

/// Build the request for `args`, falling back to configured defaults
pub fn build_request(config: &Config, args: &GenerateArgs) -> GenerateRequest {
    let model = args
        .model
        .clone()
        .unwrap_or_else(|| config.openrouter.model.clone());
    let mut request = GenerateRequest::new(
        config.openrouter.resolve_api_key(),
        model,
        args.prompt.clone(),
    )
    .with_defaults(&config.generation);

    if let Some(system) = &args.system {
        request = request.with_system_prompt(system.clone());
    }
    if let Some(project) = &args.project {
        request = request.with_project(project.clone());
    }
    if args.no_context {
        request = request.without_context();
    }
    if args.no_save {
        request = request.without_save();
    }
    request
}

/// Run one generation and print the result to stdout
pub async fn run_generate(config: Config, args: GenerateArgs) -> Result<()> {
    let store = open_store(&config)?;
    let session = build_session(&config, store)?;
    let request = build_request(&config, &args);

    if args.once {
        let outcome = session.generate_once(&request).await?;
        println!("{}", outcome.text);
        if let Some(err) = outcome.storage_error {
            eprintln!("{} {}", "Warning: response not saved:".yellow(), err);
        }
        return Ok(());
    }

    stream_to_stdout(&session, &request).await
}

/// Stream `request` to stdout; Ctrl-C cancels the stream
pub async fn stream_to_stdout(session: &GenerationSession, request: &GenerateRequest) -> Result<()> {
    let cancel = session.begin_request();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let mut stdout = std::io::stdout();
    let result = session
        .generate_stream(
            request,
            |token| {
                let _ = write!(stdout, "{}", token);
                let _ = stdout.flush();
            },
            &cancel,
        )
        .await;
    watcher.abort();
    println!();

    let outcome = result?;
    match outcome.state {
        GenerationState::Cancelled => {
            eprintln!("{}", "Generation cancelled; nothing was saved.".yellow());
        }
        _ => {
            if let Some(err) = &outcome.storage_error {
                eprintln!("{} {}", "Warning: response not saved:".yellow(), err);
            } else if let Some(id) = outcome.record_id {
                tracing::debug!("Saved as conversation {}", id);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_uses_config_defaults() {
        let mut config = Config::default();
        config.openrouter.api_key = Some("sk-config".to_string());
        config.generation.system_prompt = "Be terse.".to_string();

        let args = GenerateArgs {
            prompt: "hello".to_string(),
            ..Default::default()
        };
        let request = build_request(&config, &args);

        assert_eq!(request.api_key, "sk-config");
        assert_eq!(request.model, config.openrouter.model);
        assert_eq!(request.system_prompt, "Be terse.");
        assert!(request.use_context);
        assert!(request.save_to_memory);
        assert!(request.project_context.is_none());
    }

    #[test]
    fn test_build_request_applies_overrides() {
        let config = Config::default();
        let args = GenerateArgs {
            prompt: "hello".to_string(),
            model: Some("x/y".to_string()),
            system: Some("custom".to_string()),
            project: Some("demo".to_string()),
            no_context: true,
            no_save: true,
            once: false,
        };
        let request = build_request(&config, &args);

        assert_eq!(request.model, "x/y");
        assert_eq!(request.system_prompt, "custom");
        assert_eq!(request.project_context.as_deref(), Some("demo"));
        assert!(!request.use_context);
        assert!(!request.save_to_memory);
    }
}
