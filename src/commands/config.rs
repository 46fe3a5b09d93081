use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use colored::Colorize;

use crate::context::{self, CLIENT_KEYS};

fn validate_key(key: &str) -> Result<()> {
    if !CLIENT_KEYS.contains(&key) {
        bail!(
            "Unknown config key '{}'. Valid keys: {}",
            key,
            CLIENT_KEYS.join(", ")
        );
    }
    Ok(())
}

/// Project root when run inside a project, so its `.appwrite/` is used.
fn project_root() -> Option<PathBuf> {
    context::find_project_config()
        .ok()
        .and_then(|path| path.parent().map(Path::to_path_buf))
}

fn to_toml(key: &str, value: &str) -> Result<toml::Value> {
    if key == "self_signed" {
        let flag = value
            .parse::<bool>()
            .with_context(|| format!("self_signed must be true or false, got '{value}'"))?;
        return Ok(toml::Value::Boolean(flag));
    }
    Ok(toml::Value::String(value.to_string()))
}

fn display(key: &str, value: Option<&toml::Value>) -> String {
    match value {
        Some(toml::Value::String(s)) if s.is_empty() => "(not set)".dimmed().to_string(),
        Some(toml::Value::String(s)) if key == "api_key" => context::mask_api_key(s),
        Some(toml::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "(not set)".dimmed().to_string(),
    }
}

/// Write `key = value` into the client config used for `project_root`.
pub fn set_in(project_root: Option<&Path>, key: &str, value: &str) -> Result<PathBuf> {
    validate_key(key)?;
    let (config_path, mut config) = context::load_config_table(project_root)?;
    config.insert(key.to_string(), to_toml(key, value)?);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let output = toml::to_string_pretty(&config).context("Failed to serialize config")?;
    std::fs::write(&config_path, output)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    Ok(config_path)
}

/// Read `key` from the client config used for `project_root`.
pub fn get_in(project_root: Option<&Path>, key: &str) -> Result<Option<toml::Value>> {
    validate_key(key)?;
    let (_config_path, config) = context::load_config_table(project_root)?;
    Ok(config.get(key).cloned())
}

pub async fn set(key: String, value: String) -> Result<()> {
    let root = project_root();
    set_in(root.as_deref(), &key, &value)?;
    let shown = display(&key, Some(&to_toml(&key, &value)?));
    println!("{} {} = {}", "OK".green().bold(), key.cyan(), shown);
    Ok(())
}

pub async fn get(key: String) -> Result<()> {
    let root = project_root();
    let value = get_in(root.as_deref(), &key)?;
    println!("{} = {}", key.cyan(), display(&key, value.as_ref()));
    Ok(())
}

pub async fn list() -> Result<()> {
    let root = project_root();
    let (config_path, config) = context::load_config_table(root.as_deref())?;

    println!("{}", "Appwrite Configuration".bold().underline());
    println!(
        "  {} {}",
        "File:".dimmed(),
        config_path.display().to_string().dimmed()
    );
    println!();

    let effective = context::client_config_from_table(&config);
    for key in CLIENT_KEYS {
        println!("  {} = {}", key.cyan(), display(key, config.get(*key)));
    }
    if effective.endpoint != config.get("endpoint").and_then(|v| v.as_str()).unwrap_or_default() {
        println!();
        println!(
            "  {} effective endpoint: {}",
            "!".yellow().bold(),
            effective.endpoint
        );
    }

    Ok(())
}
