//! Typed views of the resources declared in the project config.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::{ResourceKind, ResourceRef};
use crate::schema::{Column, Index};

/// A locally declared resource that can be compared against its remote counterpart.
pub trait Tracked: Serialize + Send + Sync {
    const KIND: ResourceKind;

    /// Serialized fields that are local-only and never sent or compared.
    const SKIP_KEYS: &'static [&'static str] = &[];

    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn resource_ref(&self) -> ResourceRef {
        ResourceRef::new(self.id())
    }

    /// Comparable fields as a JSON object, without `SKIP_KEYS`.
    fn fields(&self) -> Map<String, Value> {
        let mut map = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        for key in Self::SKIP_KEYS {
            map.remove(*key);
        }
        map
    }

    /// Body for create and update calls.
    fn body(&self) -> Value {
        let mut map = self.fields();
        map.remove("$id");
        Value::Object(map)
    }

    fn label(&self) -> String {
        format!("{} ({})", self.name(), self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    #[serde(rename = "$id")]
    pub id: String,
    pub name: String,
    pub runtime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<String>,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<String>,
}

impl Tracked for Function {
    const KIND: ResourceKind = ResourceKind::Function;
    const SKIP_KEYS: &'static [&'static str] = &["path", "ignore"];

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    #[serde(rename = "$id")]
    pub id: String,
    pub name: String,
    pub framework: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_runtime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specification: Option<String>,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<String>,
}

impl Tracked for Site {
    const KIND: ResourceKind = ResourceKind::Site;
    const SKIP_KEYS: &'static [&'static str] = &["path", "ignore"];

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A database container owning tables or collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    #[serde(rename = "$id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl Tracked for Database {
    const KIND: ResourceKind = ResourceKind::TablesDb;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A table (or a collection viewed as one) with its schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    #[serde(rename = "$id")]
    pub id: String,
    pub database_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_security: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(
        rename = "$permissions",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub permissions: Option<Vec<String>>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub indexes: Vec<Index>,
}

impl Table {
    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef::nested(&self.database_id, &self.id)
    }

    pub fn label(&self) -> String {
        format!("{} ({}/{})", self.name, self.database_id, self.id)
    }
}

/// A legacy collection; converted to a [`Table`] before it is pushed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    #[serde(rename = "$id")]
    pub id: String,
    pub database_id: String,
    pub name: String,
    #[serde(default)]
    pub document_security: Option<bool>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(rename = "$permissions", default)]
    pub permissions: Option<Vec<String>>,
    #[serde(default)]
    pub attributes: Vec<Column>,
    #[serde(default)]
    pub indexes: Vec<Index>,
}

impl From<Collection> for Table {
    fn from(c: Collection) -> Self {
        Self {
            id: c.id,
            database_id: c.database_id,
            name: c.name,
            row_security: c.document_security,
            enabled: c.enabled,
            permissions: c.permissions,
            columns: c.attributes,
            indexes: c.indexes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    #[serde(rename = "$id")]
    pub id: String,
    pub name: String,
    #[serde(
        rename = "$permissions",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub permissions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_security: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_file_extensions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub antivirus: Option<bool>,
}

impl Tracked for Bucket {
    const KIND: ResourceKind = ResourceKind::Bucket;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    #[serde(rename = "$id")]
    pub id: String,
    pub name: String,
}

impl Tracked for Team {
    const KIND: ResourceKind = ResourceKind::Team;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    #[serde(rename = "$id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<Vec<String>>,
}

impl Tracked for Topic {
    const KIND: ResourceKind = ResourceKind::Topic;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Project-level settings declared under `settings`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<BTreeMap<String, bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<BTreeMap<String, bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<BTreeMap<String, Value>>,
}

/// Auth security limits and the remote project fields they map to.
pub const SECURITY_FIELDS: &[(&str, &str)] = &[
    ("duration", "authDuration"),
    ("limit", "authLimit"),
    ("sessionsLimit", "authSessionsLimit"),
    ("passwordHistory", "authPasswordHistory"),
    ("passwordDictionary", "authPasswordDictionary"),
    ("personalDataCheck", "authPersonalDataCheck"),
    ("sessionAlerts", "authSessionAlerts"),
    ("mockNumbers", "authMockNumbers"),
];

impl ProjectSettings {
    /// Rebuild the settings shape from a remote project snapshot.
    ///
    /// Services come from `serviceStatusFor*` flags, security limits from
    /// [`SECURITY_FIELDS`], and every other boolean `auth*` flag is an auth method.
    pub fn from_remote(project: &Value) -> Self {
        let Some(obj) = project.as_object() else {
            return Self::default();
        };

        let mut services = BTreeMap::new();
        let mut methods = BTreeMap::new();
        let mut security = BTreeMap::new();

        for (key, value) in obj {
            if let Some(service) = key.strip_prefix("serviceStatusFor") {
                if let Some(enabled) = value.as_bool() {
                    services.insert(service.to_lowercase(), enabled);
                }
                continue;
            }
            if let Some((local, _)) = SECURITY_FIELDS.iter().find(|(_, remote)| remote == key) {
                security.insert(local.to_string(), value.clone());
                continue;
            }
            if let (Some(method), Some(enabled)) = (key.strip_prefix("auth"), value.as_bool()) {
                methods.insert(lower_first(method), enabled);
            }
        }

        Self {
            services: Some(services),
            auth: Some(AuthSettings {
                methods: Some(methods),
                security: Some(security),
            }),
        }
    }
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_function_fields_skip_local_only_keys() {
        let f: Function = serde_json::from_value(json!({
            "$id": "api",
            "name": "API",
            "runtime": "node-18.0",
            "path": "functions/api",
            "ignore": ["node_modules"],
            "execute": ["any"]
        }))
        .unwrap();
        let fields = f.fields();
        assert!(fields.contains_key("runtime"));
        assert!(!fields.contains_key("path"));
        assert!(!fields.contains_key("ignore"));
        assert!(!fields.contains_key("timeout"));

        let body = f.body();
        assert!(body.get("$id").is_none());
        assert_eq!(body["execute"], json!(["any"]));
    }

    #[test]
    fn test_collection_converts_to_table() {
        let c: Collection = serde_json::from_value(json!({
            "$id": "posts",
            "databaseId": "main",
            "name": "Posts",
            "documentSecurity": true,
            "attributes": [{ "key": "title", "type": "string", "size": 100 }],
            "indexes": [{ "key": "by_title", "type": "key", "attributes": ["title"] }]
        }))
        .unwrap();
        let t: Table = c.into();
        assert_eq!(t.row_security, Some(true));
        assert_eq!(t.columns.len(), 1);
        assert_eq!(t.indexes[0].columns, vec!["title".to_string()]);
    }

    #[test]
    fn test_settings_from_remote_project() {
        let remote = json!({
            "name": "Demo",
            "serviceStatusForAccount": true,
            "serviceStatusForFunctions": false,
            "authEmailPassword": true,
            "authAnonymous": false,
            "authDuration": 31536000,
            "authLimit": 0,
            "authPasswordDictionary": false
        });
        let settings = ProjectSettings::from_remote(&remote);
        let services = settings.services.unwrap();
        assert_eq!(services.get("account"), Some(&true));
        assert_eq!(services.get("functions"), Some(&false));

        let auth = settings.auth.unwrap();
        let methods = auth.methods.unwrap();
        assert_eq!(methods.get("emailPassword"), Some(&true));
        assert_eq!(methods.get("anonymous"), Some(&false));
        assert!(!methods.contains_key("passwordDictionary"));

        let security = auth.security.unwrap();
        assert_eq!(security.get("duration"), Some(&json!(31536000)));
        assert_eq!(security.get("passwordDictionary"), Some(&json!(false)));
    }
}
