//! Configuration for the HTTP gateway.
//!
//! Supports reading settings from `~/.config/parley/config.json`, with
//! environment variables (`PARLEY_SERVER_URL`, `PARLEY_TOKEN`) taking
//! precedence.

use parley_core::error::{ClientError, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;

const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// Resolved gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the task-dispatch backend.
    pub server_url: String,
    /// Bearer token for the authenticated session, if any.
    pub token: Option<String>,
}

/// On-disk shape of config.json.
#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    server_url: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

impl GatewayConfig {
    pub fn new(server_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            server_url: server_url.into(),
            token,
        }
    }

    /// Loads configuration from the config file and environment.
    ///
    /// Priority per field: environment variable, then config file, then the
    /// built-in default URL. A missing config file is fine; an unreadable or
    /// malformed one is an error.
    pub fn load() -> Result<Self> {
        let file = load_file_config()?;

        let server_url = env::var("PARLEY_SERVER_URL")
            .ok()
            .or(file.server_url)
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let token = env::var("PARLEY_TOKEN").ok().or(file.token);

        Ok(Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            token,
        })
    }
}

fn load_file_config() -> Result<FileConfig> {
    let Some(path) = config_path() else {
        return Ok(FileConfig::default());
    };
    if !path.exists() {
        return Ok(FileConfig::default());
    }

    let content = fs::read_to_string(&path).map_err(|e| {
        ClientError::config(format!(
            "Failed to read configuration file at {}: {}",
            path.display(),
            e
        ))
    })?;

    serde_json::from_str(&content).map_err(|e| {
        ClientError::config(format!(
            "Failed to parse configuration file at {}: {}",
            path.display(),
            e
        ))
    })
}

/// Returns the path to the configuration file: ~/.config/parley/config.json
fn config_path() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    Some(home.join(".config").join("parley").join("config.json"))
}
