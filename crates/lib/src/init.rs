//! Write a default `config.yaml` so a fresh install only needs its tokens filled in.
//!
//! The template lives in `crates/lib/config/config.yaml`.

use anyhow::{Context, Result};
use std::path::Path;

static DEFAULT_CONFIG: &str = include_str!("../config/config.yaml");

/// Create the config file (and its parent directory) if it does not exist.
/// Returns true when a new file was written, false when one was already there.
pub fn init_config(config_path: &Path) -> Result<bool> {
    if config_path.exists() {
        log::debug!("config already exists at {}, skipping", config_path.display());
        return Ok(false);
    }
    if let Some(dir) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating config directory {}", dir.display()))?;
    }
    std::fs::write(config_path, DEFAULT_CONFIG)
        .with_context(|| format!("writing default config to {}", config_path.display()))?;
    log::info!("created default config at {}", config_path.display());
    Ok(true)
}
