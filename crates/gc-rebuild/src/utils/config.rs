//! Application configuration management utilities.

use camino::Utf8PathBuf;
use gctk_overlay::PatchLayout;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;

/// Application-wide configuration stored in config.toml.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Folder the symbol map is copied to after a rebuild.
    pub maps_dir: Option<Utf8PathBuf>,
    /// Disc locations written by the rebuild.
    pub layout: PatchLayout,
}

/// Returns the directory where the current executable resides.
pub fn install_dir() -> Option<Utf8PathBuf> {
    let exe = env::current_exe().ok()?;
    let parent = exe.parent()?;
    Utf8PathBuf::from_path_buf(parent.to_path_buf()).ok()
}

/// Returns a config file path located next to the executable.
pub fn config_path(file_name: &str) -> Option<Utf8PathBuf> {
    install_dir().map(|dir| dir.join(file_name))
}

/// Returns the default configuration file path (config.toml).
pub fn default_config_path() -> Option<Utf8PathBuf> {
    config_path("config.toml")
}

/// Loads the application configuration from config.toml.
/// Returns default configuration if file doesn't exist or cannot be parsed.
pub fn load_config() -> AppConfig {
    let Some(path) = default_config_path() else {
        return AppConfig::default();
    };
    if !path.exists() {
        return AppConfig::default();
    }

    match fs::read_to_string(&path).map(|content| parse_config(&content)) {
        Ok(Ok(cfg)) => cfg,
        Ok(Err(error)) => {
            tracing::warn!("Ignoring invalid config {}: {}", path, error);
            AppConfig::default()
        }
        Err(error) => {
            tracing::warn!("Could not read config {}: {}", path, error);
            AppConfig::default()
        }
    }
}

pub fn parse_config(content: &str) -> Result<AppConfig, toml::de::Error> {
    toml::from_str(content)
}

/// Saves the application configuration to config.toml.
pub fn save_config(cfg: &AppConfig) -> io::Result<()> {
    if let Some(path) = default_config_path() {
        let content = toml::to_string_pretty(cfg).map_err(io::Error::other)?;
        fs::write(path.as_str(), content)
    } else {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            "Could not determine config path",
        ))
    }
}
