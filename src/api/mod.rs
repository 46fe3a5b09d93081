//! The Resource API boundary the push engine talks through.
//!
//! Every remote call the engine makes goes through [`ResourceApi`], so the
//! reconciliation logic never sees HTTP. [`http::HttpResourceApi`] is the
//! production implementation; tests drive the engine with an in-memory one.

pub mod http;
pub mod query;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::schema::{Column, Index, SchemaKind};

/// Errors returned by a [`ResourceApi`] implementation.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with a non-success status.
    #[error("{message} ({code} {kind})")]
    Status {
        code: u16,
        kind: String,
        message: String,
    },

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(code: u16, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Shorthand used by in-memory implementations.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::status(404, "not_found", message)
    }

    /// True when the remote reported that the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { code: 404, .. })
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Remote resource kinds addressable through the generic verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Project,
    Function,
    Site,
    /// Container owning tables.
    TablesDb,
    /// Legacy container owning collections.
    Database,
    Table,
    Collection,
    Bucket,
    Team,
    Topic,
}

impl ResourceKind {
    /// Path of the collection endpoint, relative to the API root.
    pub fn collection_path(&self, parent: Option<&str>) -> String {
        let parent = parent.unwrap_or_default();
        match self {
            Self::Project => "/projects".to_string(),
            Self::Function => "/functions".to_string(),
            Self::Site => "/sites".to_string(),
            Self::TablesDb => "/tablesdb".to_string(),
            Self::Database => "/databases".to_string(),
            Self::Table => format!("/tablesdb/{parent}/tables"),
            Self::Collection => format!("/databases/{parent}/collections"),
            Self::Bucket => "/storage/buckets".to_string(),
            Self::Team => "/teams".to_string(),
            Self::Topic => "/messaging/topics".to_string(),
        }
    }

    /// Body field carrying the ID of a resource being created.
    pub fn id_field(&self) -> &'static str {
        match self {
            Self::Project => "projectId",
            Self::Function => "functionId",
            Self::Site => "siteId",
            Self::TablesDb | Self::Database => "databaseId",
            Self::Table => "tableId",
            Self::Collection => "collectionId",
            Self::Bucket => "bucketId",
            Self::Team => "teamId",
            Self::Topic => "topicId",
        }
    }

    /// Key holding the items array in a list response.
    pub fn list_key(&self) -> &'static str {
        match self {
            Self::Project => "projects",
            Self::Function => "functions",
            Self::Site => "sites",
            Self::TablesDb | Self::Database => "databases",
            Self::Table => "tables",
            Self::Collection => "collections",
            Self::Bucket => "buckets",
            Self::Team => "teams",
            Self::Topic => "topics",
        }
    }

    /// Plural noun used in operator output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Project => "settings",
            Self::Function => "functions",
            Self::Site => "sites",
            Self::TablesDb | Self::Database => "databases",
            Self::Table => "tables",
            Self::Collection => "collections",
            Self::Bucket => "buckets",
            Self::Team => "teams",
            Self::Topic => "topics",
        }
    }

    /// Whether create/update for this kind go through `PUT` rather than `PATCH`.
    pub fn updates_with_put(&self) -> bool {
        !matches!(self, Self::Project | Self::Topic)
    }
}

/// Address of a remote resource: its ID plus the owning container, if any.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    pub id: String,
    pub parent: Option<String>,
}

impl ResourceRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent: None,
        }
    }

    pub fn nested(parent: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent: Some(parent.into()),
        }
    }

    pub fn path(&self, kind: ResourceKind) -> String {
        format!(
            "{}/{}",
            kind.collection_path(self.parent.as_deref()),
            self.id
        )
    }
}

/// A table or collection addressed for column and index calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaRef {
    pub schema: SchemaKind,
    pub database_id: String,
    pub table_id: String,
}

impl SchemaRef {
    pub fn new(
        schema: SchemaKind,
        database_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            schema,
            database_id: database_id.into(),
            table_id: table_id.into(),
        }
    }

    pub fn table_ref(&self) -> ResourceRef {
        ResourceRef::nested(&self.database_id, &self.table_id)
    }
}

/// Deployable resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployKind {
    Function,
    Site,
}

impl DeployKind {
    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            Self::Function => ResourceKind::Function,
            Self::Site => ResourceKind::Site,
        }
    }

    /// Value of `deploymentResourceType` on proxy rules.
    pub fn rule_type(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Site => "site",
        }
    }
}

/// Everything needed to create a deployment from local source.
#[derive(Debug, Clone, Default)]
pub struct DeploymentSource {
    /// Gzipped tarball of the source directory.
    pub archive: Vec<u8>,
    pub activate: bool,
    pub entrypoint: Option<String>,
    pub commands: Option<String>,
    pub install_command: Option<String>,
    pub build_command: Option<String>,
    pub output_directory: Option<String>,
}

/// A variable attached to a function or site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub id: String,
    pub key: String,
}

/// Project-level toggles and limits that have dedicated endpoints.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectSetting {
    Service { name: String, enabled: bool },
    AuthMethod { name: String, enabled: bool },
    AuthSecurity { name: String, value: Value },
}

/// Verbs the push engine needs from the remote project.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    async fn get(&self, kind: ResourceKind, target: &ResourceRef) -> ApiResult<Value>;

    async fn list(
        &self,
        kind: ResourceKind,
        parent: Option<&str>,
        queries: &[String],
    ) -> ApiResult<Vec<Value>>;

    async fn create(
        &self,
        kind: ResourceKind,
        target: &ResourceRef,
        body: Value,
    ) -> ApiResult<Value>;

    async fn update(
        &self,
        kind: ResourceKind,
        target: &ResourceRef,
        body: Value,
    ) -> ApiResult<Value>;

    async fn delete(&self, kind: ResourceKind, target: &ResourceRef) -> ApiResult<()>;

    async fn update_project_setting(
        &self,
        project_id: &str,
        setting: &ProjectSetting,
    ) -> ApiResult<()>;

    async fn create_deployment(
        &self,
        kind: DeployKind,
        resource_id: &str,
        source: DeploymentSource,
    ) -> ApiResult<Value>;

    async fn get_deployment(
        &self,
        kind: DeployKind,
        resource_id: &str,
        deployment_id: &str,
    ) -> ApiResult<Value>;

    async fn list_variables(&self, kind: DeployKind, resource_id: &str)
        -> ApiResult<Vec<Variable>>;

    async fn create_variable(
        &self,
        kind: DeployKind,
        resource_id: &str,
        key: &str,
        value: &str,
    ) -> ApiResult<()>;

    async fn delete_variable(
        &self,
        kind: DeployKind,
        resource_id: &str,
        variable_id: &str,
    ) -> ApiResult<()>;

    async fn create_column(&self, table: &SchemaRef, column: &Column) -> ApiResult<()>;

    async fn get_column(&self, table: &SchemaRef, key: &str) -> ApiResult<Value>;

    async fn delete_column(&self, table: &SchemaRef, key: &str) -> ApiResult<()>;

    async fn create_index(&self, table: &SchemaRef, index: &Index) -> ApiResult<()>;

    async fn get_index(&self, table: &SchemaRef, key: &str) -> ApiResult<Value>;

    async fn delete_index(&self, table: &SchemaRef, key: &str) -> ApiResult<()>;

    /// Console-wide variables (`_APP_DOMAIN_FUNCTIONS`, `_APP_DOMAIN_SITES`, ...).
    async fn console_variables(&self) -> ApiResult<Value>;

    async fn create_rule(&self, kind: DeployKind, domain: &str, resource_id: &str)
        -> ApiResult<Value>;

    async fn list_rules(&self, queries: &[String]) -> ApiResult<Vec<Value>>;
}

/// Read a string field from a remote snapshot.
pub fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}
