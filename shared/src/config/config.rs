use std::fs;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::types::client_config::ClientConfig;
use crate::types::server_config::PushServerConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Load the client config, apply `NOTIFY_*` environment overrides, validate.
pub fn load_client_config(path: &str) -> Result<ClientConfig, ConfigError> {
    let mut config: ClientConfig = read_toml(path)?;
    config.apply_overrides(|key| std::env::var(key).ok());

    validate_client_config(&config)?;
    info!("Client config validated");

    Ok(config)
}

pub fn load_server_config(path: &str) -> Result<PushServerConfig, ConfigError> {
    let config: PushServerConfig = read_toml(path)?;

    validate_server_config(&config)?;
    info!("Server config validated");

    Ok(config)
}

fn read_toml<T: DeserializeOwned>(path: &str) -> Result<T, ConfigError> {
    info!("Loading configuration from: {}", path);

    let contents = fs::read_to_string(path)?;
    debug!("Processing file: {}", path);

    if contents.trim().is_empty() {
        error!("Configuration file is empty");
        return Err(ConfigError::InvalidConfig("empty file".into()));
    }

    let config = toml::from_str(&contents)?;
    info!("Configuration loaded successfully");

    Ok(config)
}

pub fn validate_client_config(config: &ClientConfig) -> Result<(), ConfigError> {
    validate_url("api.base_url", &config.api.base_url)?;
    validate_url("push.base_url", &config.push.base_url)?;

    if !config.push.subscribe_path.starts_with('/') {
        return Err(ConfigError::InvalidConfig(
            "push.subscribe_path must start with '/'".into(),
        ));
    }

    if config.push.heartbeat_timeout_secs == 0 {
        return Err(ConfigError::InvalidConfig(
            "push.heartbeat_timeout_secs must be greater than 0".into(),
        ));
    }

    if config.push.connect_timeout_secs == 0 {
        return Err(ConfigError::InvalidConfig(
            "push.connect_timeout_secs must be greater than 0".into(),
        ));
    }

    let reconnect = &config.reconnect;
    if reconnect.base_delay_ms == 0 {
        return Err(ConfigError::InvalidConfig(
            "reconnect.base_delay_ms must be greater than 0".into(),
        ));
    }

    if reconnect.max_delay_ms < reconnect.base_delay_ms {
        return Err(ConfigError::InvalidConfig(
            "reconnect.max_delay_ms must not be below reconnect.base_delay_ms".into(),
        ));
    }

    if reconnect.health_check_interval_secs == 0 {
        return Err(ConfigError::InvalidConfig(
            "reconnect.health_check_interval_secs must be greater than 0".into(),
        ));
    }

    Ok(())
}

pub fn validate_server_config(config: &PushServerConfig) -> Result<(), ConfigError> {
    if config.server.bind.is_empty() {
        return Err(ConfigError::InvalidConfig("server.bind cannot be empty".into()));
    }

    if config.server.heartbeat_secs == 0 {
        return Err(ConfigError::InvalidConfig(
            "server.heartbeat_secs must be greater than 0".into(),
        ));
    }

    if config.tokens.iter().any(|grant| grant.token.is_empty()) {
        return Err(ConfigError::InvalidConfig("tokens must not be empty strings".into()));
    }

    Ok(())
}

// Only plain HTTP: the client's connector does not speak TLS.
fn validate_url(field: &str, url: &str) -> Result<(), ConfigError> {
    if url.is_empty() {
        return Err(ConfigError::InvalidConfig(format!("{} cannot be empty", field)));
    }
    if !url.starts_with("http://") {
        return Err(ConfigError::InvalidConfig(format!(
            "{} must be an http:// URL",
            field
        )));
    }
    Ok(())
}
