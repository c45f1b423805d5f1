//! Init command - write the configuration file.

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Password};
use ssdownloader::config::ConfigFile;

use crate::error::CliError;
use crate::GlobalArgs;

fn prompt_text(label: &str, current: &str) -> Result<String, CliError> {
    let theme = ColorfulTheme::default();
    let mut input = Input::<String>::with_theme(&theme).with_prompt(label);
    if !current.is_empty() {
        input = input.default(current.to_string());
    }
    Ok(input.interact_text()?.trim().to_string())
}

fn prompt_secret(label: &str) -> Result<String, CliError> {
    Ok(Password::with_theme(&ColorfulTheme::default())
        .with_prompt(label)
        .interact()?
        .trim()
        .to_string())
}

/// Run the init command.
pub fn run(global: &GlobalArgs) -> Result<(), CliError> {
    let path = global.config_path()?;
    let mut config: ConfigFile = global.resolve()?;

    if global.ss_api_key.is_none() {
        config.ss_api_key = prompt_text("SendSafely API key", &config.ss_api_key)?;
    }
    if global.ss_api_secret.is_none() {
        config.ss_api_secret = prompt_secret("SendSafely API secret")?;
    }
    if global.zendesk_subdomain.is_none() {
        config.zendesk_subdomain =
            prompt_text("Zendesk subdomain (e.g. 'test' for https://test.zendesk.com)", &config.zendesk_subdomain)?;
    }
    if global.zendesk_email.is_none() {
        config.zendesk_email = prompt_text("Zendesk email", &config.zendesk_email)?;
    }
    if global.zendesk_token.is_none() {
        config.zendesk_token = prompt_secret("Zendesk API token")?;
    }

    config.save_to(&path)?;

    println!("Configuration file: {}", path.display());
    println!();
    println!("Edit this file to customize ssdownloader settings.");
    println!("CLI arguments override config file values when specified.");
    Ok(())
}
