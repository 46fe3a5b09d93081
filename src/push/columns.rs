//! Column Materializer: plan and drive column/index creation for one table.
//!
//! Planning compares desired definitions with the remote ones by key.
//! Missing keys are created; keys whose constraints changed are deleted and
//! then re-created, since the API has no in-place type change. Execution
//! submits each definition and polls it until the remote reports it
//! `available` or `failed`, spending one attempt per poll. Failures are
//! collected per definition and never stop sibling definitions.

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use colored::Colorize;
use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::budget::{poll_until, AttemptBudget, PollOutcome, PollState};
use super::changes::ChangeRecord;
use crate::api::{ApiError, ResourceApi, SchemaRef};
use crate::schema::{Column, DefinitionStatus, Index};

/// Shared shape of column and index definitions for planning.
pub trait Definition: Clone {
    fn key(&self) -> &str;

    /// Definitions created as a side effect of another one.
    fn owned_elsewhere(&self) -> bool {
        false
    }

    fn constraint_diff(&self, remote: &Self) -> Vec<&'static str>;

    /// Summary used in change tables.
    fn describe(&self) -> Value;
}

impl Definition for Column {
    fn key(&self) -> &str {
        &self.key
    }

    fn owned_elsewhere(&self) -> bool {
        self.is_child_side()
    }

    fn constraint_diff(&self, remote: &Self) -> Vec<&'static str> {
        Column::constraint_diff(self, remote)
    }

    fn describe(&self) -> Value {
        json!(self.endpoint_type())
    }
}

impl Definition for Index {
    fn key(&self) -> &str {
        &self.key
    }

    fn constraint_diff(&self, remote: &Self) -> Vec<&'static str> {
        Index::constraint_diff(self, remote)
    }

    fn describe(&self) -> Value {
        json!(format!("{:?}({})", self.kind, self.columns.join(", ")).to_lowercase())
    }
}

/// What must happen to bring one definition list in line with the local one.
#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionDiff<D> {
    pub create: Vec<D>,
    /// Remote exists with different constraints: delete first, then create.
    pub recreate: Vec<(D, Vec<&'static str>)>,
    /// Remote keys no longer declared locally.
    pub delete: Vec<String>,
}

impl<D> Default for DefinitionDiff<D> {
    fn default() -> Self {
        Self {
            create: Vec::new(),
            recreate: Vec::new(),
            delete: Vec::new(),
        }
    }
}

impl<D> DefinitionDiff<D> {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.recreate.is_empty() && self.delete.is_empty()
    }
}

/// Diff desired definitions against remote ones by key.
///
/// Duplicate local keys keep their first declaration. Definitions owned by
/// another definition (child-side relationships) are neither created nor deleted.
pub fn definitions_to_create<D: Definition>(remote: &[D], desired: &[D]) -> DefinitionDiff<D> {
    let mut diff = DefinitionDiff::default();
    let mut seen = HashSet::new();

    for want in desired {
        if !seen.insert(want.key().to_string()) {
            warn!(key = want.key(), "duplicate definition ignored");
            continue;
        }
        if want.owned_elsewhere() {
            continue;
        }
        match remote.iter().find(|r| r.key() == want.key()) {
            None => diff.create.push(want.clone()),
            Some(existing) => {
                let changed = want.constraint_diff(existing);
                if !changed.is_empty() {
                    diff.recreate.push((want.clone(), changed));
                }
            }
        }
    }

    for existing in remote {
        if existing.owned_elsewhere() {
            continue;
        }
        if !desired.iter().any(|d| d.key() == existing.key()) {
            diff.delete.push(existing.key().to_string());
        }
    }
    diff
}

pub fn columns_to_create(remote: &[Column], desired: &[Column]) -> DefinitionDiff<Column> {
    definitions_to_create(remote, desired)
}

pub fn indexes_to_create(remote: &[Index], desired: &[Index]) -> DefinitionDiff<Index> {
    definitions_to_create(remote, desired)
}

/// Destructive entries of a diff, as change records for the confirmation gate.
pub fn destructive_changes<D: Definition>(
    table_id: &str,
    group: &str,
    remote: &[D],
    diff: &DefinitionDiff<D>,
) -> Vec<ChangeRecord> {
    let mut changes = Vec::new();
    for (want, fields) in &diff.recreate {
        let before = remote
            .iter()
            .find(|r| r.key() == want.key())
            .map(Definition::describe)
            .unwrap_or(Value::Null);
        changes.push(ChangeRecord::new(
            table_id,
            format!("{group}.{} (recreate: {})", want.key(), fields.join(", ")),
            before,
            want.describe(),
        ));
    }
    for key in &diff.delete {
        let before = remote
            .iter()
            .find(|r| r.key() == key)
            .map(Definition::describe)
            .unwrap_or(Value::Null);
        changes.push(ChangeRecord::new(
            table_id,
            format!("{group}.{key} (delete)"),
            before,
            Value::Null,
        ));
    }
    changes
}

/// Why a single definition did not materialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The remote reported the definition as failed.
    Remote(String),
    /// The definition never left a pending status.
    TimedOut { attempts: u32 },
    /// A call for this definition returned an error.
    Api(String),
    /// An index references columns that are not available.
    MissingColumns(Vec<String>),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote(msg) if msg.is_empty() => write!(f, "failed remotely"),
            Self::Remote(msg) => write!(f, "failed remotely: {msg}"),
            Self::TimedOut { attempts } => {
                write!(f, "still processing after {attempts} checks")
            }
            Self::Api(msg) => write!(f, "{msg}"),
            Self::MissingColumns(keys) => {
                write!(f, "references unavailable columns: {}", keys.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionFailure {
    pub key: String,
    pub reason: FailureReason,
}

/// Accumulated result of materializing a batch of definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    pub created: Vec<String>,
    pub deleted: Vec<String>,
    pub failures: Vec<DefinitionFailure>,
}

impl MaterializeReport {
    pub fn merge(&mut self, other: MaterializeReport) {
        self.created.extend(other.created);
        self.deleted.extend(other.deleted);
        self.failures.extend(other.failures);
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, key: &str, reason: FailureReason) {
        self.failures.push(DefinitionFailure {
            key: key.to_string(),
            reason,
        });
    }
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Column,
    Index,
}

/// Drives definition calls for one table against the Resource API.
pub struct Materializer<'a> {
    api: &'a dyn ResourceApi,
    attempts: u32,
    interval: Duration,
}

impl<'a> Materializer<'a> {
    pub fn new(api: &'a dyn ResourceApi, attempts: u32, interval: Duration) -> Self {
        Self {
            api,
            attempts,
            interval,
        }
    }

    async fn fetch(&self, table: &SchemaRef, target: Target, key: &str) -> Result<Value, ApiError> {
        match target {
            Target::Column => self.api.get_column(table, key).await,
            Target::Index => self.api.get_index(table, key).await,
        }
    }

    /// Poll until the definition is available or failed.
    async fn await_ready(
        &self,
        table: &SchemaRef,
        target: Target,
        key: &str,
    ) -> Result<(), FailureReason> {
        let mut budget = AttemptBudget::new(self.attempts);
        let outcome = poll_until(&mut budget, self.interval, move || async move {
            let remote = self.fetch(table, target, key).await?;
            let status = remote.get("status").and_then(Value::as_str).unwrap_or("processing");
            Ok::<_, ApiError>(match DefinitionStatus::parse(status) {
                DefinitionStatus::Available => PollState::Ready(String::new()),
                DefinitionStatus::Failed => PollState::Failed(
                    remote
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                ),
                _ => PollState::Pending,
            })
        })
        .await
        .map_err(|e| FailureReason::Api(e.to_string()))?;

        match outcome {
            PollOutcome::Ready(_) => Ok(()),
            PollOutcome::Failed(msg) => Err(FailureReason::Remote(msg)),
            PollOutcome::TimedOut { attempts } => Err(FailureReason::TimedOut { attempts }),
        }
    }

    /// Poll until the definition is gone.
    async fn await_gone(
        &self,
        table: &SchemaRef,
        target: Target,
        key: &str,
    ) -> Result<(), FailureReason> {
        let mut budget = AttemptBudget::new(self.attempts);
        let outcome = poll_until(&mut budget, self.interval, move || async move {
            match self.fetch(table, target, key).await {
                Err(e) if e.is_not_found() => Ok(PollState::Ready(())),
                Err(e) => Err(e),
                Ok(_) => Ok(PollState::Pending),
            }
        })
        .await
        .map_err(|e| FailureReason::Api(e.to_string()))?;

        match outcome {
            PollOutcome::Ready(()) => Ok(()),
            PollOutcome::Failed(()) => Err(FailureReason::Remote(String::new())),
            PollOutcome::TimedOut { attempts } => Err(FailureReason::TimedOut { attempts }),
        }
    }

    async fn delete_one(&self, table: &SchemaRef, target: Target, key: &str) -> Result<(), FailureReason> {
        let result = match target {
            Target::Column => self.api.delete_column(table, key).await,
            Target::Index => self.api.delete_index(table, key).await,
        };
        match result {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(FailureReason::Api(e.to_string())),
        }
        self.await_gone(table, target, key).await
    }

    async fn create_column(&self, table: &SchemaRef, column: &Column) -> Result<(), FailureReason> {
        self.api
            .create_column(table, column)
            .await
            .map_err(|e| FailureReason::Api(e.to_string()))?;
        self.await_ready(table, Target::Column, &column.key).await
    }

    async fn create_index(&self, table: &SchemaRef, index: &Index) -> Result<(), FailureReason> {
        self.api
            .create_index(table, index)
            .await
            .map_err(|e| FailureReason::Api(e.to_string()))?;
        self.await_ready(table, Target::Index, &index.key).await
    }

    /// Create columns concurrently and wait for each to become available.
    pub async fn create_columns(&self, table: &SchemaRef, columns: &[Column]) -> MaterializeReport {
        let results = join_all(columns.iter().map(|column| async move {
            let result = self.create_column(table, column).await;
            print_definition_status(table, &column.key, "created", &result);
            (column.key.clone(), result)
        }))
        .await;
        collect(results, true)
    }

    /// Delete then re-create changed columns. Each key's delete finishes
    /// before its create is submitted; distinct keys proceed concurrently.
    pub async fn recreate_columns(&self, table: &SchemaRef, columns: &[Column]) -> MaterializeReport {
        let results = join_all(columns.iter().map(|column| async move {
            let result = match self.delete_one(table, Target::Column, &column.key).await {
                Ok(()) => self.create_column(table, column).await,
                Err(reason) => Err(reason),
            };
            print_definition_status(table, &column.key, "re-created", &result);
            (column.key.clone(), result)
        }))
        .await;
        collect(results, true)
    }

    pub async fn delete_columns(&self, table: &SchemaRef, keys: &[String]) -> MaterializeReport {
        self.delete_many(table, Target::Column, keys).await
    }

    pub async fn delete_indexes(&self, table: &SchemaRef, keys: &[String]) -> MaterializeReport {
        self.delete_many(table, Target::Index, keys).await
    }

    async fn delete_many(&self, table: &SchemaRef, target: Target, keys: &[String]) -> MaterializeReport {
        let results = join_all(keys.iter().map(|key| async move {
            let result = self.delete_one(table, target, key).await;
            print_definition_status(table, key, "deleted", &result);
            (key.clone(), result)
        }))
        .await;
        collect(results, false)
    }

    /// Wait for remote columns that are still being built.
    ///
    /// Each key gets its own attempt budget. Returns the keys that became
    /// available; the others are left for the index phase to report.
    pub async fn await_columns(&self, table: &SchemaRef, keys: &[String]) -> BTreeSet<String> {
        let results = join_all(keys.iter().map(|key| async move {
            let result = self.await_ready(table, Target::Column, key).await;
            if let Err(reason) = &result {
                warn!(table = %table.table_id, key = %key, %reason, "remote column never became available");
            }
            (key.clone(), result.is_ok())
        }))
        .await;
        results
            .into_iter()
            .filter_map(|(key, ready)| ready.then_some(key))
            .collect()
    }

    /// Create indexes whose columns are all in `available`; the rest fail
    /// without being submitted. Changed indexes are deleted first.
    pub async fn create_indexes(
        &self,
        table: &SchemaRef,
        create: &[Index],
        recreate: &[Index],
        available: &BTreeSet<String>,
    ) -> MaterializeReport {
        let jobs = create
            .iter()
            .map(|i| (i, false))
            .chain(recreate.iter().map(|i| (i, true)));
        let results = join_all(jobs.map(|(index, replace)| async move {
            let missing: Vec<String> = index
                .columns
                .iter()
                .filter(|c| !available.contains(*c))
                .cloned()
                .collect();
            let result = if !missing.is_empty() {
                Err(FailureReason::MissingColumns(missing))
            } else if replace {
                match self.delete_one(table, Target::Index, &index.key).await {
                    Ok(()) => self.create_index(table, index).await,
                    Err(reason) => Err(reason),
                }
            } else {
                self.create_index(table, index).await
            };
            print_definition_status(table, &index.key, "created index", &result);
            (index.key.clone(), result)
        }))
        .await;
        collect(results, true)
    }
}

fn collect(results: Vec<(String, Result<(), FailureReason>)>, creating: bool) -> MaterializeReport {
    let mut report = MaterializeReport::default();
    for (key, result) in results {
        match result {
            Ok(()) if creating => report.created.push(key),
            Ok(()) => report.deleted.push(key),
            Err(reason) => report.fail(&key, reason),
        }
    }
    report
}

fn print_definition_status(
    table: &SchemaRef,
    key: &str,
    action: &str,
    result: &Result<(), FailureReason>,
) {
    match result {
        Ok(()) => {
            debug!(table = %table.table_id, key, action, "definition done");
            println!(
                "    {} {} {}.{}",
                "+".green().bold(),
                action,
                table.table_id.dimmed(),
                key
            );
        }
        Err(reason) => println!(
            "    {} {}.{}: {}",
            "x".red().bold(),
            table.table_id.dimmed(),
            key,
            reason
        ),
    }
}
