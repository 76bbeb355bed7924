//! Settings loading
//!
//! Layers, lowest to highest priority:
//! 1. Built-in defaults
//! 2. TOML file (`--config`, or `quiesce.toml` in the working directory if present)
//! 3. `QUIESCE_*` environment variables (e.g. `QUIESCE_DEBOUNCE_WINDOW_SECS=30`)

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use quiesce_core::Settings;
use std::path::Path;

/// Looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "quiesce.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "QUIESCE";

/// Load settings; commands validate what they need
pub fn load(path: Option<&Path>) -> Result<Settings> {
    let file = match path {
        Some(path) => File::from(path).format(FileFormat::Toml).required(true),
        None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
    };

    let settings: Settings = Config::builder()
        .add_source(file)
        .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(settings)
}
