//! Shared helpers for locating the Appwrite project and client configuration.
//!
//! These functions walk up from the current working directory to find
//! `appwrite.config.json`, so CLI commands work from any subdirectory within a project.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use colored::Colorize;

/// Project config file names, in lookup order.
pub const PROJECT_CONFIG_FILES: &[&str] = &["appwrite.config.json", "appwrite.json"];

pub const DEFAULT_ENDPOINT: &str = "https://cloud.appwrite.io/v1";

/// Keys accepted in the client config file.
pub const CLIENT_KEYS: &[&str] = &["endpoint", "api_key", "self_signed"];

/// Connection settings for the Appwrite API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoint: String,
    pub api_key: String,
    pub self_signed: bool,
}

impl ClientConfig {
    /// Console base URL derived from the API endpoint.
    pub fn console_url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        match base.strip_suffix("/v1") {
            Some(root) => format!("{root}/console"),
            None => format!("{base}/console"),
        }
    }
}

/// Locate the nearest project config file by walking up from `start`.
pub fn find_project_config_from(start: &Path) -> Result<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        for name in PROJECT_CONFIG_FILES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        if !dir.pop() {
            bail!(
                "No appwrite.config.json found. Run {} first.",
                "appwrite init".cyan()
            );
        }
    }
}

/// Locate the nearest project config file from the current working directory.
pub fn find_project_config() -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    find_project_config_from(&cwd)
}

/// Path of the client config: `.appwrite/config.toml` beside the project
/// config, else the one in the home directory.
pub fn client_config_path(project_root: Option<&Path>) -> Result<PathBuf> {
    if let Some(root) = project_root {
        let local = root.join(".appwrite").join("config.toml");
        if local.exists() {
            return Ok(local);
        }
    }
    let home = dirs::home_dir().context("Failed to locate home directory")?;
    Ok(home.join(".appwrite").join("config.toml"))
}

/// Parse client settings from a TOML table, applying environment overrides.
pub fn client_config_from_table(table: &toml::Table) -> ClientConfig {
    let endpoint = std::env::var("APPWRITE_ENDPOINT").ok().unwrap_or_else(|| {
        table
            .get("endpoint")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_ENDPOINT)
            .to_string()
    });
    let api_key = std::env::var("APPWRITE_API_KEY").ok().unwrap_or_else(|| {
        table
            .get("api_key")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    });
    let self_signed = table
        .get("self_signed")
        .and_then(|v| v.as_bool().or_else(|| v.as_str().map(|s| s == "true")))
        .unwrap_or(false);

    ClientConfig {
        endpoint,
        api_key,
        self_signed,
    }
}

/// Load client settings for the project rooted at `project_root`.
pub fn load_client_config(project_root: Option<&Path>) -> Result<ClientConfig> {
    let (_, table) = load_config_table(project_root)?;
    let config = client_config_from_table(&table);
    if config.api_key.is_empty() {
        bail!(
            "API key not configured. Run {} first.",
            "appwrite config set api_key <key>".cyan()
        );
    }
    Ok(config)
}

/// Load the client config as a `toml::Table` (for config set/get/list).
///
/// A missing file yields an empty table.
pub fn load_config_table(project_root: Option<&Path>) -> Result<(PathBuf, toml::Table)> {
    let config_path = client_config_path(project_root)?;
    if !config_path.exists() {
        return Ok((config_path, toml::Table::new()));
    }
    let contents = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;
    let config: toml::Table = contents
        .parse()
        .with_context(|| format!("Failed to parse {}", config_path.display()))?;
    Ok((config_path, config))
}

/// Mask an API key for display, keeping a short prefix and suffix.
pub fn mask_api_key(key: &str) -> String {
    if key.len() <= 12 {
        return "****".to_string();
    }
    format!("{}...{}", &key[..8], &key[key.len() - 4..])
}
