//! aiDroid - code generation with conversation memory
//!
#![doc = "Main entry point for the aiDroid command-line client."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use aidroid::cli::{Cli, Commands};
use aidroid::commands;
use aidroid::commands::generate::GenerateArgs;
use aidroid::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    #[cfg(feature = "prometheus")]
    aidroid::metrics::init_metrics_exporter()?;

    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;
    config.validate()?;

    match cli.command {
        Commands::Generate {
            prompt,
            model,
            system,
            project,
            no_context,
            no_save,
            once,
        } => {
            tracing::debug!("Generate: once={}, project={:?}", once, project);
            let args = GenerateArgs {
                prompt,
                model,
                system,
                project,
                no_context,
                no_save,
                once,
            };
            commands::generate::run_generate(config, args).await
        }
        Commands::Chat { model, project } => {
            tracing::info!("Starting interactive chat");
            commands::chat::run_chat(config, model, project).await
        }
        Commands::History { limit, project } => {
            commands::history::show_history(&config, limit, project.as_deref())
        }
        Commands::Similar { query, limit } => {
            commands::history::show_similar(&config, &query, limit)
        }
        Commands::Stats => commands::history::show_stats(&config),
        Commands::Cleanup { days } => commands::history::run_cleanup(&config, days),
        Commands::Project { command } => commands::project::handle_project(&config, command),
        Commands::Snippet { command } => commands::project::handle_snippet(&config, command),
        Commands::Models { json } => commands::models::list_models(&config, json).await,
        Commands::Cache { command } => commands::cache::handle_cache(&config, command),
    }
}

/// Logs go to stderr so streamed output on stdout stays clean
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "aidroid=debug" } else { "aidroid=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
