use std::path::Path;

use sipsync_core::util::{is_http_url, normalize_text_option};

use crate::cli::ConfigCommands;
use crate::config_file::CliConfig;
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, config_path: &Path) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            user,
            remote_url,
            auth_token,
            sync_interval_secs,
        } => run_config_init(config_path, user, remote_url, auth_token, sync_interval_secs),
        ConfigCommands::Show { json } => run_config_show(config_path, json),
    }
}

pub fn run_config_init(
    config_path: &Path,
    user: Option<String>,
    remote_url: Option<String>,
    auth_token: Option<String>,
    sync_interval_secs: Option<u64>,
) -> Result<(), CliError> {
    let existing = CliConfig::load_from_path(config_path)?;
    let config = merge_config_init(existing, user, remote_url, auth_token, sync_interval_secs)?;
    config.save_to_path(config_path)?;

    println!("Saved config to {}", config_path.display());
    Ok(())
}

/// Apply `config init` flags over an existing config; unset flags keep old values.
pub fn merge_config_init(
    mut config: CliConfig,
    user: Option<String>,
    remote_url: Option<String>,
    auth_token: Option<String>,
    sync_interval_secs: Option<u64>,
) -> Result<CliConfig, CliError> {
    if let Some(user) = normalize_text_option(user) {
        config.user_id = Some(user);
    }
    if let Some(url) = normalize_text_option(remote_url) {
        if !is_http_url(&url) {
            return Err(CliError::Config(
                "--remote-url must include http:// or https://".into(),
            ));
        }
        config.sync.remote_base_url = Some(url.trim_end_matches('/').to_string());
    }
    if let Some(token) = normalize_text_option(auth_token) {
        config.sync.auth_token = Some(token);
    }
    if let Some(secs) = sync_interval_secs {
        config.sync.sync_interval_secs = secs;
    }

    config.sync.validate()?;
    Ok(config)
}

pub fn run_config_show(config_path: &Path, as_json: bool) -> Result<(), CliError> {
    let config = CliConfig::load_from_path(config_path)?;
    let mut settings = config.effective_settings()?;
    if settings.auth_token.is_some() {
        settings.auth_token = Some("<redacted>".to_string());
    }

    if as_json {
        let view = CliConfig {
            sync: settings,
            ..config
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("config file:        {}", config_path.display());
    println!(
        "user:               {}",
        config.user_id.as_deref().unwrap_or("(not set)")
    );
    println!(
        "remote:             {}",
        settings.remote_base_url().as_deref().unwrap_or("(not set)")
    );
    println!(
        "auth token:         {}",
        settings.auth_token.as_deref().unwrap_or("(not set)")
    );
    println!("sync interval:      {}s", settings.sync_interval_secs);
    println!("retry cooldown:     {}s", settings.retry_cooldown_secs);
    println!("submit timeout:     {}s", settings.submit_timeout_secs);
    println!("reconnect debounce: {}ms", settings.reconnect_debounce_ms);
    Ok(())
}
