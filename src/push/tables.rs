//! Tables and collections.
//!
//! A schema push runs in two stages. Container reconciliation first brings
//! the remote databases in line with the local declarations; any failure
//! there ends the whole run. The selected tables are then planned against
//! their remote snapshots, confirmed, and materialized: tables and plain
//! columns first, relationships once every table exists, indexes last.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, Result};
use colored::Colorize;
use futures::future::join_all;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::changes::{diff_fields, ChangeRecord};
use super::columns::{
    columns_to_create, destructive_changes, indexes_to_create, DefinitionDiff, MaterializeReport,
    Materializer,
};
use super::confirm::{confirm_changes, confirm_deletion, confirm_listed};
use super::{
    print_empty_hint, resolve_selection, PushContext, PushError, PushKind, PushSummary,
    ResourceFailure, Selection,
};
use crate::api::{str_field, ResourceApi, ResourceRef, SchemaRef};
use crate::config::{self, ConfigStore};
use crate::models::{Database, Table, Tracked};
use crate::schema::{remote_definitions, Column, DefinitionStatus, Index, SchemaKind};

pub async fn push_tables(ctx: &PushContext<'_>, store: &mut ConfigStore) -> Result<PushSummary> {
    push_schema(ctx, store, SchemaKind::Tables).await
}

pub async fn push_collections(
    ctx: &PushContext<'_>,
    store: &mut ConfigStore,
) -> Result<PushSummary> {
    push_schema(ctx, store, SchemaKind::Collections).await
}

fn push_kind(schema: SchemaKind) -> PushKind {
    match schema {
        SchemaKind::Tables => PushKind::Tables,
        SchemaKind::Collections => PushKind::Collections,
    }
}

fn config_keys(schema: SchemaKind) -> (&'static str, &'static str) {
    match schema {
        SchemaKind::Tables => (config::TABLES_DB, config::TABLES),
        SchemaKind::Collections => (config::DATABASES, config::COLLECTIONS),
    }
}

async fn push_schema(
    ctx: &PushContext<'_>,
    store: &mut ConfigStore,
    schema: SchemaKind,
) -> Result<PushSummary> {
    let kind = push_kind(schema);
    let noun = kind.name();
    let mut summary = PushSummary::new(schema.entity_kind().label());
    let (containers_key, items_key) = config_keys(schema);

    let containers = match schema {
        SchemaKind::Tables => store.get_tables_dbs()?,
        SchemaKind::Collections => store.get_databases()?,
    };
    if store.declares(containers_key) {
        let deleted = reconcile_containers(ctx, schema, &containers).await?;
        if !deleted.is_empty() {
            let dropped = store.prune_by_database(items_key, &deleted);
            if dropped > 0 {
                info!(dropped, "dropped {noun}s of deleted databases from the project config");
                store.save()?;
            }
        }
    }

    let local = match schema {
        SchemaKind::Tables => store.get_tables()?,
        SchemaKind::Collections => store.get_collections()?,
    };
    let selection = ctx.options.selection(kind);
    let stale = if matches!(selection, Selection::Ids(_)) {
        Vec::new()
    } else {
        find_stale_tables(ctx.api, schema, &containers, &local).await?
    };
    let selected = resolve_selection(
        ctx.prompter,
        &selection,
        noun,
        local,
        |t| t.id.as_str(),
        Table::label,
    )?;
    if selected.is_empty() && stale.is_empty() {
        print_empty_hint(noun);
        return Ok(summary);
    }

    let plans = join_all(
        selected
            .into_iter()
            .map(|table| plan_table(ctx.api, schema, table)),
    )
    .await
    .into_iter()
    .collect::<Result<Vec<_>>>()?;

    let changes: Vec<ChangeRecord> = plans.iter().flat_map(TablePlan::changes).collect();
    if !confirm_changes(ctx.prompter, ctx.options.force, &changes)? {
        return Ok(summary);
    }

    let stale_labels: Vec<String> = stale
        .iter()
        .map(|r| format!("{}/{}", r.parent.as_deref().unwrap_or_default(), r.id))
        .collect();
    if confirm_listed(
        ctx.prompter,
        ctx.options.force,
        &format!("{noun}s"),
        &stale_labels,
    )? {
        delete_stale_tables(ctx, schema, &stale, &mut summary).await;
    }

    materialize(ctx, schema, plans, &mut summary).await;
    Ok(summary)
}

/// Create, update and delete remote containers to match `local`.
///
/// Returns the IDs of the containers deleted remotely.
async fn reconcile_containers(
    ctx: &PushContext<'_>,
    schema: SchemaKind,
    local: &[Database],
) -> Result<Vec<String>> {
    let kind = schema.container_kind();
    let failed = |e: &dyn std::fmt::Display| PushError::ContainerReconciliation(e.to_string());

    let remote = ctx
        .api
        .list(kind, None, &[])
        .await
        .map_err(|e| failed(&e))?;

    let mut creates = Vec::new();
    let mut updates = Vec::new();
    for db in local {
        match remote.iter().find(|r| str_field(r, "$id") == Some(db.id.as_str())) {
            None => creates.push(db),
            Some(existing) => {
                if !diff_fields(&db.id, &db.fields(), existing, &["$id"]).is_empty() {
                    updates.push(db);
                }
            }
        }
    }

    let doomed: Vec<(String, String)> = remote
        .iter()
        .filter_map(|r| {
            let id = str_field(r, "$id")?;
            if local.iter().any(|db| db.id == id) {
                return None;
            }
            Some((id.to_string(), str_field(r, "name").unwrap_or(id).to_string()))
        })
        .collect();
    let labels: Vec<String> = doomed
        .iter()
        .map(|(id, name)| format!("{name} ({id})"))
        .collect();
    let approved = confirm_deletion(
        ctx.prompter,
        ctx.options.force,
        "databases",
        &format!("Every {} inside them will be deleted too.", push_kind(schema).name()),
        &labels,
    )?;
    let deletes: Vec<String> = if approved {
        doomed.into_iter().map(|(id, _)| id).collect()
    } else {
        Vec::new()
    };

    let calls = creates
        .iter()
        .map(|db| async move {
            ctx.api
                .create(kind, &ResourceRef::new(&db.id), db.body())
                .await
                .map(|_| println!("{} Created database {}", "+".green().bold(), db.id.bold()))
        })
        .collect::<Vec<_>>();
    let update_calls = updates.iter().map(|db| async move {
        ctx.api
            .update(kind, &ResourceRef::new(&db.id), db.body())
            .await
            .map(|_| println!("{} Updated database {}", "~".yellow().bold(), db.id.bold()))
    });
    let delete_calls = deletes.iter().map(|id| async move {
        ctx.api
            .delete(kind, &ResourceRef::new(id))
            .await
            .map(|_| println!("{} Deleted database {}", "-".red().bold(), id.bold()))
    });

    let mut results = join_all(calls).await;
    results.extend(join_all(update_calls).await);
    results.extend(join_all(delete_calls).await);
    if let Some(err) = results.into_iter().find_map(Result::err) {
        return Err(failed(&err).into());
    }
    Ok(deletes)
}

/// Remote tables inside locally declared containers that the config no longer lists.
async fn find_stale_tables(
    api: &dyn ResourceApi,
    schema: SchemaKind,
    containers: &[Database],
    local: &[Table],
) -> Result<Vec<ResourceRef>> {
    let lists = join_all(containers.iter().map(|db| async move {
        let remote = match api.list(schema.entity_kind(), Some(&db.id), &[]).await {
            Ok(items) => items,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to list remote tables of '{}'", db.id)))
            }
        };
        Ok(remote
            .iter()
            .filter_map(|r| str_field(r, "$id"))
            .filter(|id| !local.iter().any(|t| t.database_id == db.id && t.id == *id))
            .map(|id| ResourceRef::nested(&db.id, id))
            .collect::<Vec<_>>())
    }))
    .await;

    let mut stale = Vec::new();
    for list in lists {
        stale.extend(list?);
    }
    Ok(stale)
}

async fn delete_stale_tables(
    ctx: &PushContext<'_>,
    schema: SchemaKind,
    stale: &[ResourceRef],
    summary: &mut PushSummary,
) {
    let results = join_all(stale.iter().map(|target| async move {
        let result = ctx.api.delete(schema.entity_kind(), target).await;
        (target, result)
    }))
    .await;
    for (target, result) in results {
        match result {
            Ok(()) => println!(
                "{} Deleted {} {}",
                "-".red().bold(),
                push_kind(schema).name(),
                target.id.bold()
            ),
            Err(e) => summary.failures.push(ResourceFailure {
                id: target.id.clone(),
                error: anyhow::Error::new(e).context("Failed to delete remote table"),
            }),
        }
    }
}

/// The fields compared and sent for the table itself.
fn table_fields(schema: SchemaKind, table: &Table) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("name".into(), json!(table.name));
    if let Some(security) = table.row_security {
        map.insert(schema.security_field().into(), json!(security));
    }
    if let Some(enabled) = table.enabled {
        map.insert("enabled".into(), json!(enabled));
    }
    if let Some(permissions) = &table.permissions {
        map.insert("$permissions".into(), json!(permissions));
    }
    map
}

/// Everything one table needs, computed from a single remote read.
#[derive(Debug)]
struct TablePlan {
    table: Table,
    target: SchemaRef,
    exists: bool,
    field_changes: Vec<ChangeRecord>,
    remote_columns: Vec<Column>,
    remote_indexes: Vec<Index>,
    columns: DefinitionDiff<Column>,
    indexes: DefinitionDiff<Index>,
}

impl TablePlan {
    fn is_noop(&self) -> bool {
        self.exists
            && self.field_changes.is_empty()
            && self.columns.is_empty()
            && self.indexes.is_empty()
    }

    /// Field changes plus every destructive definition change.
    fn changes(&self) -> Vec<ChangeRecord> {
        let noun = self.target.schema.columns_key();
        let mut changes = self.field_changes.clone();
        changes.extend(destructive_changes(
            &self.table.id,
            noun,
            &self.remote_columns,
            &self.columns,
        ));
        changes.extend(destructive_changes(
            &self.table.id,
            "indexes",
            &self.remote_indexes,
            &self.indexes,
        ));
        changes
    }

    fn recreated_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.recreate.iter().map(|(c, _)| c)
    }

    fn replaced_columns(&self) -> BTreeSet<&str> {
        self.columns
            .delete
            .iter()
            .map(String::as_str)
            .chain(self.recreated_columns().map(|c| c.key.as_str()))
            .collect()
    }

    /// Column keys usable by indexes before anything is applied.
    fn available_columns(&self) -> BTreeSet<String> {
        let gone = self.replaced_columns();
        self.remote_columns
            .iter()
            .filter(|c| c.status() == DefinitionStatus::Available)
            .filter(|c| !gone.contains(c.key.as_str()))
            .map(|c| c.key.clone())
            .collect()
    }

    /// Remote columns still processing that a pending index refers to.
    fn pending_index_columns(&self) -> Vec<String> {
        let gone = self.replaced_columns();
        let wanted: BTreeSet<&str> = self
            .indexes
            .create
            .iter()
            .chain(self.indexes.recreate.iter().map(|(i, _)| i))
            .flat_map(|i| i.columns.iter().map(String::as_str))
            .collect();
        self.remote_columns
            .iter()
            .filter(|c| c.status() == DefinitionStatus::Processing)
            .filter(|c| wanted.contains(c.key.as_str()) && !gone.contains(c.key.as_str()))
            .map(|c| c.key.clone())
            .collect()
    }
}

async fn plan_table(api: &dyn ResourceApi, schema: SchemaKind, table: Table) -> Result<TablePlan> {
    let target = SchemaRef::new(schema, &table.database_id, &table.id);
    let remote = match api.get(schema.entity_kind(), &table.resource_ref()).await {
        Ok(remote) => Some(remote),
        Err(e) if e.is_not_found() => None,
        Err(e) => {
            return Err(anyhow::Error::new(e).context(format!(
                "Failed to fetch remote {} '{}'",
                push_kind(schema).name(),
                table.id
            )))
        }
    };

    let (remote_columns, remote_indexes) = remote
        .as_ref()
        .map(|r| remote_definitions(schema, r))
        .unwrap_or_default();
    let field_changes = remote
        .as_ref()
        .map(|r| diff_fields(&table.id, &table_fields(schema, &table), r, &[]))
        .unwrap_or_default();
    let columns = columns_to_create(&remote_columns, &table.columns);
    let indexes = indexes_to_create(&remote_indexes, &table.indexes);
    debug!(
        table = %table.id,
        exists = remote.is_some(),
        create = columns.create.len(),
        recreate = columns.recreate.len(),
        delete = columns.delete.len(),
        "planned table"
    );

    Ok(TablePlan {
        table,
        target,
        exists: remote.is_some(),
        field_changes,
        remote_columns,
        remote_indexes,
        columns,
        indexes,
    })
}

/// Apply the table itself, its deletions and its plain columns.
async fn apply_plain(
    ctx: &PushContext<'_>,
    materializer: &Materializer<'_>,
    plan: &TablePlan,
) -> Result<MaterializeReport> {
    let kind = plan.target.schema.entity_kind();
    let body = Value::Object(table_fields(plan.target.schema, &plan.table));
    let noun = push_kind(plan.target.schema).name();
    if !plan.exists {
        ctx.api
            .create(kind, &plan.table.resource_ref(), body)
            .await
            .map_err(|e| anyhow::Error::new(e).context(format!("Failed to create {noun}")))?;
        println!("{} Created {noun} {}", "+".green().bold(), plan.table.id.bold());
    } else if !plan.field_changes.is_empty() {
        ctx.api
            .update(kind, &plan.table.resource_ref(), body)
            .await
            .map_err(|e| anyhow::Error::new(e).context(format!("Failed to update {noun}")))?;
        println!("{} Updated {noun} {}", "~".yellow().bold(), plan.table.id.bold());
    }

    let mut report = MaterializeReport::default();
    report.merge(materializer.delete_indexes(&plan.target, &plan.indexes.delete).await);
    report.merge(materializer.delete_columns(&plan.target, &plan.columns.delete).await);

    let recreate: Vec<Column> = plan
        .recreated_columns()
        .filter(|c| !c.is_relationship())
        .cloned()
        .collect();
    report.merge(materializer.recreate_columns(&plan.target, &recreate).await);

    let create: Vec<Column> = plan
        .columns
        .create
        .iter()
        .filter(|c| !c.is_relationship())
        .cloned()
        .collect();
    report.merge(materializer.create_columns(&plan.target, &create).await);
    Ok(report)
}

async fn apply_relationships(materializer: &Materializer<'_>, plan: &TablePlan) -> MaterializeReport {
    let recreate: Vec<Column> = plan
        .recreated_columns()
        .filter(|c| c.is_relationship())
        .cloned()
        .collect();
    let create: Vec<Column> = plan
        .columns
        .create
        .iter()
        .filter(|c| c.is_relationship())
        .cloned()
        .collect();

    let mut report = materializer.recreate_columns(&plan.target, &recreate).await;
    report.merge(materializer.create_columns(&plan.target, &create).await);
    report
}

async fn materialize(
    ctx: &PushContext<'_>,
    schema: SchemaKind,
    plans: Vec<TablePlan>,
    summary: &mut PushSummary,
) {
    let materializer = Materializer::new(
        ctx.api,
        ctx.options.attempts,
        ctx.options.poll_interval,
    );
    let noun = push_kind(schema).name();

    let (noop, work): (Vec<TablePlan>, Vec<TablePlan>) =
        plans.into_iter().partition(TablePlan::is_noop);
    summary.pushed += noop.len();
    for plan in &noop {
        debug!(table = %plan.table.id, "already in sync");
    }

    for plan in &work {
        println!("{} Pushing {noun} {} ...", ">".cyan().bold(), plan.table.id.bold());
    }
    let plain = join_all(work.iter().map(|plan| apply_plain(ctx, &materializer, plan))).await;

    let mut live = Vec::new();
    for (plan, result) in work.iter().zip(plain) {
        match result {
            Ok(report) => live.push((plan, report)),
            Err(error) => summary.failures.push(ResourceFailure {
                id: plan.table.id.clone(),
                error,
            }),
        }
    }

    let related = join_all(live.iter().map(|(plan, _)| apply_relationships(&materializer, plan))).await;
    for ((_, report), extra) in live.iter_mut().zip(related) {
        report.merge(extra);
    }

    // Two-way relationships also add a column to the related table.
    let mut twins: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (plan, report) in &live {
        for column in plan.table.columns.iter().filter(|c| c.is_relationship()) {
            if !report.created.contains(&column.key) || !column.two_way.unwrap_or(false) {
                continue;
            }
            if let (Some(related), Some(key)) = (&column.related_table, &column.two_way_key) {
                twins.entry(related.clone()).or_default().push(key.clone());
            }
        }
    }

    let index_reports = join_all(live.iter().map(|(plan, report)| {
        let mut available = plan.available_columns();
        available.extend(report.created.iter().cloned());
        if let Some(keys) = twins.get(&plan.table.id) {
            available.extend(keys.iter().cloned());
        }
        let materializer = &materializer;
        async move {
            let pending = plan.pending_index_columns();
            if !pending.is_empty() {
                available.extend(materializer.await_columns(&plan.target, &pending).await);
            }
            let recreate: Vec<Index> =
                plan.indexes.recreate.iter().map(|(i, _)| i.clone()).collect();
            materializer
                .create_indexes(&plan.target, &plan.indexes.create, &recreate, &available)
                .await
        }
    }))
    .await;

    for ((plan, mut report), indexes) in live.into_iter().zip(index_reports) {
        report.merge(indexes);
        if report.is_success() {
            summary.pushed += 1;
            continue;
        }
        let details: Vec<String> = report
            .failures
            .iter()
            .map(|f| format!("{}: {}", f.key, f.reason))
            .collect();
        summary.failures.push(ResourceFailure {
            id: plan.table.id.clone(),
            error: anyhow!(
                "{} definition(s) did not materialize ({})",
                report.failures.len(),
                details.join("; ")
            ),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    fn table(columns: Vec<Column>) -> Table {
        Table {
            id: "users".into(),
            database_id: "main".into(),
            name: "Users".into(),
            row_security: Some(true),
            enabled: None,
            permissions: None,
            columns,
            indexes: Vec::new(),
        }
    }

    #[test]
    fn test_table_fields_use_schema_security_name() {
        let t = table(Vec::new());
        let fields = table_fields(SchemaKind::Collections, &t);
        assert_eq!(fields["documentSecurity"], json!(true));
        assert!(!fields.contains_key("rowSecurity"));
        assert!(!fields.contains_key("enabled"));
    }

    #[test]
    fn test_available_columns_exclude_pending_and_replaced() {
        let mut ready = Column::new("name", ColumnType::String);
        ready.status = Some("available".into());
        let mut pending = Column::new("email", ColumnType::String);
        pending.status = Some("processing".into());
        let mut retyped = Column::new("age", ColumnType::Integer);
        retyped.status = Some("available".into());

        let remote_columns = vec![ready, pending, retyped];
        let local = table(vec![
            Column::new("name", ColumnType::String),
            Column::new("email", ColumnType::String),
            Column::new("age", ColumnType::String),
        ]);
        let columns = columns_to_create(&remote_columns, &local.columns);
        let plan = TablePlan {
            target: SchemaRef::new(SchemaKind::Tables, "main", "users"),
            table: local,
            exists: true,
            field_changes: Vec::new(),
            remote_columns,
            remote_indexes: Vec::new(),
            columns,
            indexes: DefinitionDiff::default(),
        };

        let available = plan.available_columns();
        assert!(available.contains("name"));
        assert!(!available.contains("email"));
        assert!(!available.contains("age"));
        assert_eq!(plan.changes().len(), 1);
    }

    #[test]
    fn test_pending_index_columns_only_lists_referenced_processing_columns() {
        let mut building = Column::new("email", ColumnType::String);
        building.status = Some("processing".into());
        let mut unused = Column::new("bio", ColumnType::String);
        unused.status = Some("processing".into());

        let remote_columns = vec![building, unused];
        let mut local = table(vec![
            Column::new("email", ColumnType::String),
            Column::new("bio", ColumnType::String),
        ]);
        local.indexes = vec![Index::new("by_email", crate::schema::IndexType::Unique, &["email"])];
        let plan = TablePlan {
            target: SchemaRef::new(SchemaKind::Tables, "main", "users"),
            columns: columns_to_create(&remote_columns, &local.columns),
            indexes: indexes_to_create(&[], &local.indexes),
            table: local,
            exists: true,
            field_changes: Vec::new(),
            remote_columns,
            remote_indexes: Vec::new(),
        };

        assert_eq!(plan.pending_index_columns(), vec!["email".to_string()]);
        assert!(plan.available_columns().is_empty());
    }
}
