//! Model catalogue command

use colored::Colorize;
use prettytable::{row, Table};

use crate::config::Config;
use crate::error::Result;
use crate::transport::{BackendTransport, ModelInfo};

/// List the models offered by the backend
///
/// # Arguments
///
/// * `config` - Global configuration
/// * `json` - Print JSON instead of a table
///
/// # Errors
///
/// Returns an error if the backend cannot be reached or answers badly.
pub async fn list_models(config: &Config, json: bool) -> Result<()> {
    let backend = BackendTransport::new(&config.backend.base_url)?;
    let models = backend.list_models().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    if models.is_empty() {
        println!("{}", "The backend offers no models.".yellow());
        return Ok(());
    }
    output_models_table(&models, &config.chat.default_provider);
    Ok(())
}

/// Output models in table format
fn output_models_table(models: &[ModelInfo], default_provider: &str) {
    let mut table = Table::new();
    table.add_row(row!["Id", "Display Name", "Provider", "Upstream Model"]);

    for model in models {
        let id = if model.id == default_provider {
            format!("{} (default)", model.id)
        } else {
            model.id.clone()
        };
        table.add_row(row![id, model.name, model.provider, model.model]);
    }

    println!("\nAvailable models:\n");
    table.printstd();
    println!();
    println!(
        "Use {} to compare several of them.",
        "copilot-sidebar chat --models a,b".cyan()
    );
}
