//! The project config (`appwrite.config.json`) as a typed store.
//!
//! The file is kept as a JSON object so keys the CLI does not model survive a
//! save untouched. Getters parse typed views on demand.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::models::{Bucket, Collection, Database, Function, ProjectSettings, Site, Table, Team, Topic};

pub const FUNCTIONS: &str = "functions";
pub const SITES: &str = "sites";
pub const TABLES_DB: &str = "tablesDB";
pub const DATABASES: &str = "databases";
pub const TABLES: &str = "tables";
pub const COLLECTIONS: &str = "collections";
pub const BUCKETS: &str = "buckets";
pub const TEAMS: &str = "teams";
pub const TOPICS: &str = "topics";

/// Identity and settings of the project the config belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectInfo {
    pub id: String,
    pub name: Option<String>,
    pub settings: Option<ProjectSettings>,
}

/// Local Config Store backed by a JSON file (or memory, for tests).
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    data: Map<String, Value>,
}

impl ConfigStore {
    /// Load and parse the project config at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let value: Value = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        let Value::Object(data) = value else {
            bail!("{} must contain a JSON object", path.display());
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            data,
        })
    }

    /// A store that is never written to disk.
    pub fn in_memory(value: Value) -> Result<Self> {
        let Value::Object(data) = value else {
            bail!("project config must be a JSON object");
        };
        Ok(Self { path: None, data })
    }

    /// Directory that relative resource paths resolve against.
    pub fn root(&self) -> PathBuf {
        self.path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Write the config back as pretty JSON. In-memory stores are a no-op.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let output = serde_json::to_string_pretty(&self.data)
            .context("Failed to serialize project config")?;
        std::fs::write(path, output + "\n")
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(path = %path.display(), "saved project config");
        Ok(())
    }

    pub fn get_project(&self) -> Result<ProjectInfo> {
        let id = self
            .data
            .get("projectId")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .context("projectId is missing from the project config")?
            .to_string();
        let name = self
            .data
            .get("projectName")
            .and_then(Value::as_str)
            .map(str::to_string);
        let settings = match self.data.get("settings") {
            Some(value) => Some(
                serde_json::from_value(value.clone()).context("Invalid 'settings' section")?,
            ),
            None => None,
        };
        Ok(ProjectInfo { id, name, settings })
    }

    /// Whether the config declares a `key` section at all, even an empty one.
    pub fn declares(&self, key: &str) -> bool {
        self.data.get(key).is_some_and(Value::is_array)
    }

    fn get_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let Some(items) = self.data.get(key).and_then(Value::as_array) else {
            return Ok(Vec::new());
        };
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value(item.clone())
                    .with_context(|| format!("Invalid entry #{} in '{key}'", i + 1))
            })
            .collect()
    }

    pub fn get_functions(&self) -> Result<Vec<Function>> {
        self.get_list(FUNCTIONS)
    }

    pub fn get_sites(&self) -> Result<Vec<Site>> {
        self.get_list(SITES)
    }

    pub fn get_tables_dbs(&self) -> Result<Vec<Database>> {
        self.get_list(TABLES_DB)
    }

    pub fn get_databases(&self) -> Result<Vec<Database>> {
        self.get_list(DATABASES)
    }

    pub fn get_tables(&self) -> Result<Vec<Table>> {
        self.get_list(TABLES)
    }

    /// Collections, converted to the table shape the schema engine works with.
    pub fn get_collections(&self) -> Result<Vec<Table>> {
        Ok(self
            .get_list::<Collection>(COLLECTIONS)?
            .into_iter()
            .map(Table::from)
            .collect())
    }

    pub fn get_buckets(&self) -> Result<Vec<Bucket>> {
        self.get_list(BUCKETS)
    }

    pub fn get_teams(&self) -> Result<Vec<Team>> {
        self.get_list(TEAMS)
    }

    pub fn get_messaging_topics(&self) -> Result<Vec<Topic>> {
        self.get_list(TOPICS)
    }

    /// Set `field` on the entry of `key` whose `$id` is `id`.
    ///
    /// Returns false when no such entry exists.
    pub fn set_field(&mut self, key: &str, id: &str, field: &str, value: Value) -> bool {
        let Some(items) = self.data.get_mut(key).and_then(Value::as_array_mut) else {
            return false;
        };
        for item in items.iter_mut() {
            if item.get("$id").and_then(Value::as_str) == Some(id) {
                if let Value::Object(obj) = item {
                    obj.insert(field.to_string(), value);
                    return true;
                }
            }
        }
        false
    }

    /// Drop entries of `key` whose `databaseId` is in `database_ids`.
    pub fn prune_by_database(&mut self, key: &str, database_ids: &[String]) -> usize {
        let Some(items) = self.data.get_mut(key).and_then(Value::as_array_mut) else {
            return 0;
        };
        let before = items.len();
        items.retain(|item| {
            let db = item.get("databaseId").and_then(Value::as_str).unwrap_or_default();
            !database_ids.iter().any(|id| id == db)
        });
        before - items.len()
    }
}
