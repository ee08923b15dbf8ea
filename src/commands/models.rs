//! Model listing for aiDroid
//!
//! Queries `GET /models` on the configured OpenRouter endpoint and prints
//! the result as a table or as JSON.

use crate::config::Config;
use crate::error::{AidroidError, Result};
use crate::providers::{ModelInfo, OpenRouterProvider, Provider};
use prettytable::{row, Table};

/// List available models
///
/// # Examples
///
/// ```no_run
/// use aidroid::config::Config;
/// use aidroid::commands::models::list_models;
///
/// # async fn example() -> anyhow::Result<()> {
/// list_models(&Config::default(), false).await?;
/// # Ok(())
/// # }
/// ```
pub async fn list_models(config: &Config, json: bool) -> Result<()> {
    let provider = OpenRouterProvider::new(config.openrouter.clone())?;
    let api_key = config.openrouter.resolve_api_key();
    if api_key.is_empty() {
        return Err(AidroidError::Validation(
            "An OpenRouter API key is required (openrouter.api_key or OPENROUTER_API_KEY)"
                .to_string(),
        )
        .into());
    }

    tracing::info!("Listing models from {}", provider.name());
    let models = provider.list_models(&api_key).await?;

    if json {
        println!("{}", render_models_json(&models)?);
    } else if models.is_empty() {
        println!("No models available from {}", config.openrouter.api_base);
    } else {
        output_models_table(&models, &config.openrouter.model);
    }

    Ok(())
}

fn render_models_json(models: &[ModelInfo]) -> Result<String> {
    Ok(serde_json::to_string_pretty(models)?)
}

/// Output models in table format, marking the configured default
fn output_models_table(models: &[ModelInfo], current: &str) {
    let mut table = Table::new();
    table.add_row(row!["Model", "Name", "Context Window", "Default"]);

    for model in models {
        let context = model
            .context_length
            .map(|n| format!("{} tokens", n))
            .unwrap_or_else(|| "-".to_string());
        let marker = if model.id == current { "*" } else { "" };
        table.add_row(row![model.id, model.name, context, marker]);
    }

    println!("\nAvailable models:\n");
    table.printstd();
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_models_json() {
        let models = vec![ModelInfo {
            id: "openai/gpt-4o-mini".to_string(),
            name: "GPT-4o mini".to_string(),
            context_length: Some(128000),
        }];
        let json = render_models_json(&models).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["id"], "openai/gpt-4o-mini");
        assert_eq!(parsed[0]["context_length"], 128000);
    }

    #[test]
    fn test_render_empty_list() {
        assert_eq!(render_models_json(&[]).unwrap(), "[]");
    }
}
