use colored::Colorize;
use rustyline::DefaultEditor;

use crate::credentials::{has_valid_api_key, CredentialStore};
use crate::error::{CopilotError, Result};

/// Store or clear the direct-provider API key
///
/// Without `key` the user is prompted for it.
///
/// # Errors
///
/// Returns [`CopilotError::Validation`] for a blank key and an error when
/// the keyring rejects the write.
pub async fn run_auth(key: Option<String>, clear: bool) -> Result<()> {
    let store = CredentialStore::default();
    if clear {
        store.clear()?;
        println!("{}", "Removed stored API key".green());
        return Ok(());
    }

    let key = match key {
        Some(key) => key,
        None => {
            let mut rl = DefaultEditor::new()?;
            rl.readline("Gemini API key: ")?
        }
    };
    if !has_valid_api_key(Some(&key)) {
        return Err(CopilotError::Validation("API key must not be empty".to_string()).into());
    }

    store.store_api_key(&key)?;
    println!(
        "{}",
        "API key stored. Use --frontend-only to call Gemini directly.".green()
    );
    Ok(())
}
