//! Column and index definitions for tables and collections.
//!
//! Tables (TablesDB) and collections (legacy Databases) share one definition
//! model; [`SchemaKind`] carries the naming differences between the two APIs.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::warn;

use crate::api::ResourceKind;

/// Which schema API a table-like resource lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    Tables,
    Collections,
}

impl SchemaKind {
    pub fn container_kind(&self) -> ResourceKind {
        match self {
            Self::Tables => ResourceKind::TablesDb,
            Self::Collections => ResourceKind::Database,
        }
    }

    pub fn entity_kind(&self) -> ResourceKind {
        match self {
            Self::Tables => ResourceKind::Table,
            Self::Collections => ResourceKind::Collection,
        }
    }

    /// Path segment and response key for column definitions.
    pub fn columns_key(&self) -> &'static str {
        match self {
            Self::Tables => "columns",
            Self::Collections => "attributes",
        }
    }

    /// Body field naming the related table of a relationship column.
    pub fn related_field(&self) -> &'static str {
        match self {
            Self::Tables => "relatedTableId",
            Self::Collections => "relatedCollectionId",
        }
    }

    /// Body field listing the columns an index covers.
    pub fn index_columns_field(&self) -> &'static str {
        match self {
            Self::Tables => "columns",
            Self::Collections => "attributes",
        }
    }

    pub fn security_field(&self) -> &'static str {
        match self {
            Self::Tables => "rowSecurity",
            Self::Collections => "documentSecurity",
        }
    }
}

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Integer,
    #[serde(alias = "float")]
    Double,
    Boolean,
    Datetime,
    Relationship,
    Point,
    Line,
    Polygon,
}

/// Lifecycle status reported by the remote for a column or index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionStatus {
    Available,
    Processing,
    Deleting,
    Failed,
}

impl DefinitionStatus {
    /// Map the API vocabulary; anything unrecognised is still in progress.
    pub fn parse(s: &str) -> Self {
        match s {
            "available" => Self::Available,
            "failed" | "stuck" => Self::Failed,
            "deleting" => Self::Deleting,
            _ => Self::Processing,
        }
    }
}

/// A typed field definition on a table or collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: ColumnType,
    #[serde(default, skip_serializing)]
    pub status: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypt: Option<bool>,
    #[serde(
        default,
        alias = "relatedCollection",
        skip_serializing_if = "Option::is_none"
    )]
    pub related_table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub two_way: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub two_way_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<String>,
}

impl Column {
    pub fn new(key: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            key: key.into(),
            kind,
            status: None,
            required: false,
            array: None,
            size: None,
            min: None,
            max: None,
            default: None,
            format: None,
            elements: None,
            encrypt: None,
            related_table: None,
            relation_type: None,
            two_way: None,
            two_way_key: None,
            on_delete: None,
            side: None,
        }
    }

    pub fn is_relationship(&self) -> bool {
        self.kind == ColumnType::Relationship
    }

    /// The child side of a two-way relationship is created by its parent.
    pub fn is_child_side(&self) -> bool {
        self.is_relationship() && self.side.as_deref() == Some("child")
    }

    pub fn status(&self) -> DefinitionStatus {
        DefinitionStatus::parse(self.status.as_deref().unwrap_or("available"))
    }

    /// Endpoint segment used to create this column.
    pub fn endpoint_type(&self) -> &'static str {
        match self.kind {
            ColumnType::String => match self.format.as_deref() {
                Some("email") => "email",
                Some("enum") => "enum",
                Some("ip") => "ip",
                Some("url") => "url",
                _ => "string",
            },
            ColumnType::Integer => "integer",
            ColumnType::Double => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Datetime => "datetime",
            ColumnType::Relationship => "relationship",
            ColumnType::Point => "point",
            ColumnType::Line => "line",
            ColumnType::Polygon => "polygon",
        }
    }

    /// Names of constraints where `remote` diverges from this definition.
    ///
    /// Constraints left unset locally are not compared.
    pub fn constraint_diff(&self, remote: &Column) -> Vec<&'static str> {
        let mut diff = Vec::new();
        if self.kind != remote.kind {
            diff.push("type");
        }
        if self.format.is_some() && self.format != remote.format {
            diff.push("format");
        }
        if self.required != remote.required {
            diff.push("required");
        }
        if self.array.unwrap_or(false) != remote.array.unwrap_or(false) {
            diff.push("array");
        }
        if self.size.is_some() && self.size != remote.size {
            diff.push("size");
        }
        if self.min.is_some() && !numbers_equal(&self.min, &remote.min) {
            diff.push("min");
        }
        if self.max.is_some() && !numbers_equal(&self.max, &remote.max) {
            diff.push("max");
        }
        if !defaults_equal(&self.default, &remote.default) {
            diff.push("default");
        }
        if self.elements.is_some() && self.elements != remote.elements {
            diff.push("elements");
        }
        if self.encrypt.is_some() && self.encrypt.unwrap_or(false) != remote.encrypt.unwrap_or(false)
        {
            diff.push("encrypt");
        }
        if self.is_relationship() {
            if self.related_table.is_some() && self.related_table != remote.related_table {
                diff.push("relatedTable");
            }
            if self.relation_type.is_some() && self.relation_type != remote.relation_type {
                diff.push("relationType");
            }
            if self.two_way.is_some()
                && self.two_way.unwrap_or(false) != remote.two_way.unwrap_or(false)
            {
                diff.push("twoWay");
            }
            if self.on_delete.is_some() && self.on_delete != remote.on_delete {
                diff.push("onDelete");
            }
        }
        diff
    }
}

fn numbers_equal(a: &Option<Number>, b: &Option<Number>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        },
        (None, None) => true,
        _ => false,
    }
}

fn defaults_equal(local: &Option<Value>, remote: &Option<Value>) -> bool {
    let local = local.as_ref().filter(|v| !v.is_null());
    let remote = remote.as_ref().filter(|v| !v.is_null());
    match (local, remote) {
        (None, None) => true,
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            numbers_equal(&Some(a.clone()), &Some(b.clone()))
        }
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    Key,
    Unique,
    Fulltext,
    Spatial,
}

/// An index over one or more columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: IndexType,
    #[serde(alias = "attributes")]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Per-column sort order; the API reports `null` for columns without one.
    pub orders: Option<Vec<Option<String>>>,
}

impl Index {
    pub fn new(key: impl Into<String>, kind: IndexType, columns: &[&str]) -> Self {
        Self {
            key: key.into(),
            kind,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            orders: None,
        }
    }

    pub fn constraint_diff(&self, remote: &Index) -> Vec<&'static str> {
        let mut diff = Vec::new();
        if self.kind != remote.kind {
            diff.push("type");
        }
        if self.columns != remote.columns {
            diff.push("columns");
        }
        if let Some(orders) = &self.orders {
            let remote_orders = remote.orders.clone().unwrap_or_default();
            if !orders.is_empty() && *orders != remote_orders {
                diff.push("orders");
            }
        }
        diff
    }
}

/// Parse the column and index arrays out of a remote table snapshot.
///
/// Entries the local model does not understand are skipped with a warning.
pub fn remote_definitions(schema: SchemaKind, table: &Value) -> (Vec<Column>, Vec<Index>) {
    (
        parse_definitions(table, schema.columns_key()),
        parse_definitions(table, "indexes"),
    )
}

fn parse_definitions<D: DeserializeOwned>(table: &Value, field: &str) -> Vec<D> {
    let Some(items) = table.get(field).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match D::deserialize(item) {
            Ok(definition) => Some(definition),
            Err(e) => {
                let key = item.get("key").and_then(Value::as_str).unwrap_or("?");
                warn!(field, key, error = %e, "skipping unreadable remote definition");
                None
            }
        })
        .collect()
}
