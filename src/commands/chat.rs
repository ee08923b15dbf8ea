//! Interactive generation loop
//!
//! Each line read with `rustyline` becomes one streamed request through the
//! same session, so every answer sees the previous exchanges as context.

use crate::commands::generate::{build_request, stream_to_stdout, GenerateArgs};
use crate::commands::{build_session, open_store};
use crate::config::Config;
use crate::error::Result;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const EXIT_COMMANDS: [&str; 3] = ["/exit", "/quit", "exit"];

/// Start the interactive loop
pub async fn run_chat(config: Config, model: Option<String>, project: Option<String>) -> Result<()> {
    let store = open_store(&config)?;
    let session = build_session(&config, store)?;
    let mut rl = DefaultEditor::new()
        .map_err(|e| anyhow::anyhow!("Failed to initialise line editor: {}", e))?;

    let active_model = model.clone().unwrap_or_else(|| config.openrouter.model.clone());
    println!("{} {}", "aiDroid chat".bold(), format!("({})", active_model).dimmed());
    if let Some(project) = &project {
        println!("Project context: {}", project.cyan());
    }
    println!("Type {} to quit, Ctrl-C cancels a running answer.\n", "/exit".cyan());

    loop {
        match rl.readline(&format!("{} ", ">>".green())) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if EXIT_COMMANDS.contains(&trimmed) {
                    break;
                }
                let _ = rl.add_history_entry(trimmed);

                let args = GenerateArgs {
                    prompt: trimmed.to_string(),
                    model: model.clone(),
                    project: project.clone(),
                    ..Default::default()
                };
                let request = build_request(&config, &args);
                if let Err(e) = stream_to_stdout(&session, &request).await {
                    eprintln!("{} {}", "Error:".red(), e);
                }
                println!();
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                tracing::error!("Readline error: {}", e);
                break;
            }
        }
    }

    tracing::info!("Chat session ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_commands() {
        assert!(EXIT_COMMANDS.contains(&"/exit"));
        assert!(!EXIT_COMMANDS.contains(&"exit please"));
    }
}
