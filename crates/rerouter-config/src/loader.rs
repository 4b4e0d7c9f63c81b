use crate::config::Config;
use crate::validate::validate_config;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Reads the TOML file (if any), overlays the process environment, validates.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = read_config_file(path)?;
    config.apply_env(|key| std::env::var(key).ok());
    validate_config(&config)?;
    Ok(config)
}

pub fn read_config_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        // Env-only deployments have no file at all
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse TOML config file at {:?}", path))?;

    Ok(config)
}
