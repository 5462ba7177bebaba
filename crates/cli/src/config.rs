//! CLI configuration utilities

use anyhow::{Context, Result, bail};
use portal_core::{PortalConfig, StateDir};
use std::path::{Path, PathBuf};

/// Resolve the state directory, `--state-dir` winning over the platform default
pub fn state_dir(override_dir: Option<PathBuf>) -> StateDir {
    override_dir.map_or_else(StateDir::new, StateDir::with_override)
}

/// Load configuration from `explicit`, else from the state directory's config
/// file when one exists, else defaults; environment variables apply on top.
pub fn load_config(state_dir: &StateDir, explicit: Option<&Path>) -> Result<PortalConfig> {
    let default_path = state_dir.config_path();
    let path = match explicit {
        Some(path) => Some(path),
        None if default_path.exists() => Some(default_path.as_path()),
        None => None,
    };

    PortalConfig::load(path).with_context(|| match path {
        Some(path) => format!("Failed to load configuration from {}", path.display()),
        None => "Failed to load configuration".to_string(),
    })
}

/// Generate a default configuration file
pub fn generate_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        );
    }
    PortalConfig::default().save(path)?;
    Ok(())
}
