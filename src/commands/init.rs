use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde_json::json;

use crate::context::PROJECT_CONFIG_FILES;
use crate::prompt::{Prompter, TerminalPrompter};

const DEFAULT_CLIENT_CONFIG: &str = r#"# Appwrite client configuration
# Values here can be overridden with APPWRITE_ENDPOINT and APPWRITE_API_KEY.

# API endpoint of your Appwrite instance
endpoint = "https://cloud.appwrite.io/v1"

# Project API key (set via `appwrite config set api_key <key>`)
api_key = ""

# Accept self-signed certificates (self-hosted instances only)
self_signed = false
"#;

const GITIGNORE: &str = "# Appwrite client settings contain the API key\nconfig.toml\n";

/// Files written by [`scaffold`], relative to the project root.
pub const SCAFFOLD_FILES: &[&str] = &[
    "appwrite.config.json",
    ".appwrite/config.toml",
    ".appwrite/.gitignore",
];

/// Write a fresh project config and client config under `base_dir`.
///
/// Fails if a project config already exists there.
pub fn scaffold(base_dir: &Path, project_id: &str, project_name: &str) -> Result<PathBuf> {
    for name in PROJECT_CONFIG_FILES {
        if base_dir.join(name).exists() {
            bail!("An Appwrite project is already initialized at {}", base_dir.display());
        }
    }
    if project_id.trim().is_empty() {
        bail!("Project ID must not be empty");
    }

    std::fs::create_dir_all(base_dir)
        .with_context(|| format!("Failed to create {}", base_dir.display()))?;

    let config_path = base_dir.join(PROJECT_CONFIG_FILES[0]);
    let project = json!({
        "projectId": project_id.trim(),
        "projectName": project_name.trim(),
        "settings": {},
        "functions": [],
        "sites": [],
        "tables": [],
        "buckets": [],
        "teams": [],
        "topics": []
    });
    let contents = serde_json::to_string_pretty(&project).context("Failed to serialize project config")?;
    std::fs::write(&config_path, contents + "\n")
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    let client_dir = base_dir.join(".appwrite");
    std::fs::create_dir_all(&client_dir)
        .with_context(|| format!("Failed to create {}", client_dir.display()))?;
    let client_config = client_dir.join("config.toml");
    if !client_config.exists() {
        std::fs::write(&client_config, DEFAULT_CLIENT_CONFIG)
            .with_context(|| format!("Failed to write {}", client_config.display()))?;
    }
    std::fs::write(client_dir.join(".gitignore"), GITIGNORE)
        .with_context(|| format!("Failed to write {}", client_dir.join(".gitignore").display()))?;

    Ok(config_path)
}

pub async fn run(
    path: Option<String>,
    project_id: Option<String>,
    project_name: Option<String>,
) -> Result<()> {
    let base_dir = match path {
        Some(p) => PathBuf::from(p),
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    if PROJECT_CONFIG_FILES.iter().any(|name| base_dir.join(name).exists()) {
        println!(
            "{} Appwrite project already initialized at {}",
            "!".yellow().bold(),
            base_dir.display().to_string().dimmed()
        );
        return Ok(());
    }

    let prompter = TerminalPrompter;
    let project_id = match project_id {
        Some(id) => id,
        None => prompter.input("Project ID", None)?,
    };
    let project_name = match project_name {
        Some(name) => name,
        None => prompter.input("Project name", Some(&project_id))?,
    };

    println!(
        "{} Initializing Appwrite project in {}",
        ">".cyan().bold(),
        base_dir.display().to_string().bold()
    );
    scaffold(&base_dir, &project_id, &project_name)?;
    for file in SCAFFOLD_FILES {
        println!("  {} Created {}", "+".green().bold(), file.dimmed());
    }

    println!();
    println!("{} Appwrite project initialized!", "OK".green().bold());
    println!();
    println!("Next steps:");
    println!("  {} Set your API key", "1.".dimmed());
    println!("     {}", "appwrite config set api_key <key>".cyan());
    println!("  {} Declare resources in appwrite.config.json", "2.".dimmed());
    println!("  {} Push them", "3.".dimmed());
    println!("     {}", "appwrite push all".cyan());

    Ok(())
}
