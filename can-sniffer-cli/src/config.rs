//! Configuration loading and parsing
//!
//! Optional TOML file with the link, engine and database settings; command
//! line flags override whatever the file provides.

use anyhow::{Context, Result};
use can_sniffer_core::config::MonitorConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from a TOML file).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub engine: MonitorConfig,
    #[serde(default)]
    pub databases: DatabaseConfig,
}

/// Serial link settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkConfig {
    /// Serial port path (e.g. "/dev/ttyUSB0", "COM7").
    pub port: Option<String>,
    #[serde(default = "default_baud")]
    pub baud: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            port: None,
            baud: default_baud(),
        }
    }
}

fn default_baud() -> u32 {
    115200
}

/// Paths of the persisted label databases.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_id_labels")]
    pub id_labels: PathBuf,
    #[serde(default = "default_function_codes")]
    pub function_codes: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            id_labels: default_id_labels(),
            function_codes: default_function_codes(),
        }
    }
}

fn default_id_labels() -> PathBuf {
    PathBuf::from("deciphered_ids.json")
}

fn default_function_codes() -> PathBuf {
    PathBuf::from("function_codes.json")
}

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}
