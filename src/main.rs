//! Copilot Sidebar - terminal front-end for the chat backend
#![doc = "Main entry point for the copilot-sidebar application."]

use anyhow::Result;

use copilot_sidebar::cli::{Cli, Commands};
use copilot_sidebar::commands;
use copilot_sidebar::config::Config;
use copilot_sidebar::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;
    config.validate()?;

    init_logging(&config.logging)?;
    tracing::debug!(
        backend = %config.backend.base_url,
        frontend_only = config.direct.frontend_only_mode,
        "Configuration loaded"
    );

    match cli.command {
        Commands::Chat { provider, models } => {
            commands::chat::run_chat(config, provider, models).await
        }
        Commands::Ask {
            prompt,
            provider,
            models,
            attach,
        } => {
            tracing::debug!(models = models.len(), attachments = attach.len(), "Single question");
            commands::ask::run_ask(&config, &prompt, provider, models, attach).await
        }
        Commands::Sessions { command } => {
            commands::sessions::handle_sessions(&config, command).await
        }
        Commands::Health { providers } => commands::health::run_health(&config, providers).await,
        Commands::Models { json } => commands::models::list_models(&config, json).await,
        Commands::Auth { key, clear } => commands::auth::run_auth(key, clear).await,
    }
}
