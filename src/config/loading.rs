//! Configuration loading functionality.
//!
//! Resolves the configuration path, reads the file as TOML or JSON depending
//! on its extension, and validates the result before handing it out.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::Configuration;
use super::validation::validate_config;
use crate::constants::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};

/// Load configuration from an explicit path, or from the default location
/// when `path` is `None`.
pub fn load(path: Option<&Path>) -> Result<Configuration> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    #[cfg(debug_assertions)]
    eprintln!("DEBUG: config::load() - config_path: {}", config_path.display());

    load_from_path(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))
}

/// Load and validate configuration from a specific path.
pub fn load_from_path(path: &Path) -> Result<Configuration> {
    if !path.exists() {
        anyhow::bail!("Configuration file not found at {}", path.display());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let config = if is_json {
        parse_json(&content)
    } else {
        parse_toml(&content)
    }
    .with_context(|| format!("Failed to parse config from {}", path.display()))?;

    validate_config(&config)?;

    Ok(config)
}

/// Parse a TOML document without validating it.
pub fn parse_toml(content: &str) -> Result<Configuration> {
    toml::from_str(content).context("Invalid TOML configuration")
}

/// Parse a JSON document without validating it.
pub fn parse_json(content: &str) -> Result<Configuration> {
    serde_json::from_str(content).context("Invalid JSON configuration")
}

/// `$XDG_CONFIG_HOME/terracontrol/terracontrol.toml`
pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
