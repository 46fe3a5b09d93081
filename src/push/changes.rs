//! Field-by-field comparison of local records against remote snapshots.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table};
use futures::future::join_all;
use serde_json::{Map, Value};

use crate::api::ResourceApi;
use crate::models::Tracked;

/// One detected divergence between a local record and its remote counterpart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    /// Resource the divergence belongs to.
    pub id: String,
    /// Field path; nested settings use dotted keys.
    pub key: String,
    pub remote: Value,
    pub local: Value,
}

impl ChangeRecord {
    pub fn new(id: impl Into<String>, key: impl Into<String>, remote: Value, local: Value) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            remote,
            local,
        }
    }
}

/// Null, empty string and empty array all mean "nothing set".
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Equality with blank-equivalence; arrays compare structurally, in order.
pub fn values_equivalent(local: &Value, remote: &Value) -> bool {
    if is_blank(local) && is_blank(remote) {
        return true;
    }
    match (local, remote) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        },
        (Value::Array(_), Value::Array(_)) => local.to_string() == remote.to_string(),
        _ => local == remote,
    }
}

/// Compare every local field (except `skip`) against `remote`.
///
/// Nested objects are compared key by key; each diverging field yields its
/// own record.
pub fn diff_fields(
    id: &str,
    local: &Map<String, Value>,
    remote: &Value,
    skip: &[&str],
) -> Vec<ChangeRecord> {
    let mut changes = Vec::new();
    diff_into(id, "", local, remote, skip, &mut changes);
    changes
}

fn diff_into(
    id: &str,
    prefix: &str,
    local: &Map<String, Value>,
    remote: &Value,
    skip: &[&str],
    out: &mut Vec<ChangeRecord>,
) {
    for (key, local_value) in local {
        if skip.contains(&key.as_str()) {
            continue;
        }
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        let remote_value = remote.get(key).unwrap_or(&Value::Null);

        if let Value::Object(nested) = local_value {
            if remote_value.is_object() || remote_value.is_null() {
                diff_into(id, &path, nested, remote_value, &[], out);
                continue;
            }
        }
        if !values_equivalent(local_value, remote_value) {
            out.push(ChangeRecord::new(
                id,
                path,
                remote_value.clone(),
                local_value.clone(),
            ));
        }
    }
}

/// Fetch each record's remote counterpart concurrently and diff it.
///
/// A missing remote means the record will be created, so it contributes no
/// changes. Any other fetch error aborts the whole detection.
pub async fn detect_changes<R: Tracked>(
    api: &dyn ResourceApi,
    records: &[R],
    skip: &[&str],
) -> Result<Vec<ChangeRecord>> {
    let checks = records.iter().map(|record| async move {
        match api.get(R::KIND, &record.resource_ref()).await {
            Ok(remote) => Ok(diff_fields(record.id(), &record.fields(), &remote, skip)),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err::<Vec<ChangeRecord>, _>(e).with_context(|| {
                format!(
                    "Failed to fetch remote {} '{}'",
                    R::KIND.label(),
                    record.id()
                )
            }),
        }
    });

    let mut changes = Vec::new();
    for result in join_all(checks).await {
        changes.extend(result?);
    }
    Ok(changes)
}

/// Human-readable cell text for a JSON value.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "(empty)".to_string(),
        Value::String(s) if s.is_empty() => "(empty)".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn render_changes(changes: &[ChangeRecord]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        Cell::new("id").fg(Color::Cyan),
        Cell::new("key").fg(Color::Cyan),
        Cell::new("remote").fg(Color::Cyan),
        Cell::new("local").fg(Color::Cyan),
    ]);
    for change in changes {
        table.add_row(vec![
            Cell::new(&change.id),
            Cell::new(&change.key),
            Cell::new(display_value(&change.remote)).fg(Color::Red),
            Cell::new(display_value(&change.local)).fg(Color::Green),
        ]);
    }
    table
}
