//! Project configuration (pagelet.toml).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pagelet_sandbox::{ExecuteOptions, SandboxLimits};
use serde::Deserialize;

/// Configuration file structure.
#[derive(Debug, Deserialize, Default, PartialEq)]
pub struct ProjectConfig {
    #[serde(default)]
    pub pages: PagesConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sandbox: SandboxLimits,
    #[serde(default)]
    pub preview: ExecuteOptions,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct PagesConfig {
    #[serde(default = "default_pages_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for PagesConfig {
    fn default() -> Self {
        Self {
            dir: default_pages_dir(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_pages_dir() -> PathBuf {
    PathBuf::from("pages")
}
fn default_store_dir() -> PathBuf {
    PathBuf::from(".pagelet/records")
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7878
}

/// Load configuration from `path` if it exists.
/// Returns an error if the config file exists but is malformed.
pub fn load_config(path: &Path) -> Result<ProjectConfig> {
    if !path.exists() {
        tracing::debug!("No {}, using defaults", path.display());
        return Ok(ProjectConfig::default());
    }

    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let config: ProjectConfig =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}
