//! In-memory Resource API and scripted prompter shared by the push tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use appwrite_cli::api::{
    ApiError, ApiResult, DeployKind, DeploymentSource, ProjectSetting, ResourceApi, ResourceKind,
    ResourceRef, SchemaRef, Variable,
};
use appwrite_cli::config::ConfigStore;
use appwrite_cli::models::SECURITY_FIELDS;
use appwrite_cli::prompt::Prompter;
use appwrite_cli::push::{PushContext, PushOptions};
use appwrite_cli::schema::{Column, Index};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

type Key = (ResourceKind, Option<String>, String);

#[derive(Default)]
struct State {
    resources: BTreeMap<Key, Value>,
    /// Status reported for columns with these keys instead of `available`.
    column_status: HashMap<String, String>,
    /// Status reported for every deployment; `ready` when unset.
    deployment_status: Option<String>,
    deployment_polls: usize,
    /// Answer deployment creation without an `$id`.
    anonymous_deployments: bool,
    deployments: usize,
    variables: Vec<(String, Variable)>,
    rules: Vec<Value>,
    /// Calls answered with a server error.
    failing: Vec<String>,
    calls: Vec<String>,
}

/// A Resource API backed by a map, recording every call it receives.
#[derive(Default)]
pub struct MockApi {
    state: Mutex<State>,
}

const READ_VERBS: &[&str] = &[
    "get",
    "list",
    "get_column",
    "get_index",
    "get_deployment",
    "list_variables",
    "console_variables",
    "list_rules",
];

fn key(kind: ResourceKind, target: &ResourceRef) -> Key {
    (kind, target.parent.clone(), target.id.clone())
}

fn describe(kind: ResourceKind, target: &ResourceRef) -> String {
    match &target.parent {
        Some(parent) => format!("{} {}/{}", kind.label(), parent, target.id),
        None => format!("{} {}", kind.label(), target.id),
    }
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a remote resource.
    pub fn insert(&self, kind: ResourceKind, target: ResourceRef, mut value: Value) {
        if let Value::Object(map) = &mut value {
            map.insert("$id".into(), json!(target.id));
        }
        let mut state = self.state.lock().unwrap();
        state.resources.insert(key(kind, &target), value);
    }

    pub fn resource(&self, kind: ResourceKind, target: &ResourceRef) -> Option<Value> {
        self.state
            .lock()
            .unwrap()
            .resources
            .get(&key(kind, target))
            .cloned()
    }

    pub fn set_column_status(&self, column: &str, status: &str) {
        self.state
            .lock()
            .unwrap()
            .column_status
            .insert(column.to_string(), status.to_string());
    }

    pub fn set_deployment_status(&self, status: &str) {
        self.state.lock().unwrap().deployment_status = Some(status.to_string());
    }

    pub fn omit_deployment_ids(&self) {
        self.state.lock().unwrap().anonymous_deployments = true;
    }

    pub fn deployment_polls(&self) -> usize {
        self.state.lock().unwrap().deployment_polls
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls that change remote state.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| {
                let verb = c.split(' ').next().unwrap_or_default();
                !READ_VERBS.contains(&verb)
            })
            .collect()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Make every call described as `call` fail with a 500.
    pub fn fail_on(&self, call: &str) {
        self.state.lock().unwrap().failing.push(call.to_string());
    }

    fn log(&self, call: String) -> ApiResult<()> {
        let mut state = self.state.lock().unwrap();
        let fails = state.failing.contains(&call);
        state.calls.push(call);
        if fails {
            return Err(ApiError::status(500, "general_unknown", "server error"));
        }
        Ok(())
    }

    /// Run `f` on the definitions array of a table.
    fn with_definitions<T>(
        &self,
        table: &SchemaRef,
        field: &str,
        f: impl FnOnce(&mut Vec<Value>, &HashMap<String, String>) -> ApiResult<T>,
    ) -> ApiResult<T> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let table_key = key(table.schema.entity_kind(), &table.table_ref());
        let Some(remote) = state.resources.get_mut(&table_key) else {
            return Err(ApiError::not_found(format!("table {} not found", table.table_id)));
        };
        let Value::Object(map) = remote else {
            return Err(ApiError::Decode("table is not an object".into()));
        };
        let entry = map.entry(field.to_string()).or_insert_with(|| json!([]));
        let Value::Array(items) = entry else {
            return Err(ApiError::Decode(format!("{field} is not an array")));
        };
        let mut items_owned = std::mem::take(items);
        let result = f(&mut items_owned, &state.column_status);
        if let Some(Value::Object(map)) = state.resources.get_mut(&table_key) {
            map.insert(field.to_string(), Value::Array(items_owned));
        }
        result
    }
}

fn find_definition(items: &[Value], key: &str) -> ApiResult<Value> {
    items
        .iter()
        .find(|c| c.get("key").and_then(Value::as_str) == Some(key))
        .cloned()
        .ok_or_else(|| ApiError::not_found(format!("definition {key} not found")))
}

fn remove_definition(items: &mut Vec<Value>, key: &str) -> ApiResult<()> {
    let before = items.len();
    items.retain(|c| c.get("key").and_then(Value::as_str) != Some(key));
    if items.len() == before {
        return Err(ApiError::not_found(format!("definition {key} not found")));
    }
    Ok(())
}

#[async_trait]
impl ResourceApi for MockApi {
    async fn get(&self, kind: ResourceKind, target: &ResourceRef) -> ApiResult<Value> {
        self.log(format!("get {}", describe(kind, target)))?;
        self.resource(kind, target)
            .ok_or_else(|| ApiError::not_found(format!("{} not found", describe(kind, target))))
    }

    async fn list(
        &self,
        kind: ResourceKind,
        parent: Option<&str>,
        _queries: &[String],
    ) -> ApiResult<Vec<Value>> {
        self.log(format!("list {} {}", kind.label(), parent.unwrap_or("-")))?;
        let state = self.state.lock().unwrap();
        Ok(state
            .resources
            .iter()
            .filter(|((k, p, _), _)| *k == kind && p.as_deref() == parent)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn create(
        &self,
        kind: ResourceKind,
        target: &ResourceRef,
        body: Value,
    ) -> ApiResult<Value> {
        self.log(format!("create {}", describe(kind, target)))?;
        let mut state = self.state.lock().unwrap();
        let k = key(kind, target);
        if state.resources.contains_key(&k) {
            return Err(ApiError::status(409, "already_exists", "resource already exists"));
        }
        let mut map = match body {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        map.insert("$id".into(), json!(target.id));
        if matches!(kind, ResourceKind::Table) {
            map.entry("columns").or_insert_with(|| json!([]));
            map.entry("indexes").or_insert_with(|| json!([]));
        }
        if matches!(kind, ResourceKind::Collection) {
            map.entry("attributes").or_insert_with(|| json!([]));
            map.entry("indexes").or_insert_with(|| json!([]));
        }
        let value = Value::Object(map);
        state.resources.insert(k, value.clone());
        Ok(value)
    }

    async fn update(
        &self,
        kind: ResourceKind,
        target: &ResourceRef,
        body: Value,
    ) -> ApiResult<Value> {
        self.log(format!("update {}", describe(kind, target)))?;
        let mut state = self.state.lock().unwrap();
        let Some(Value::Object(existing)) = state.resources.get_mut(&key(kind, target)) else {
            return Err(ApiError::not_found("not found"));
        };
        if let Value::Object(fields) = body {
            for (k, v) in fields {
                existing.insert(k, v);
            }
        }
        Ok(Value::Object(existing.clone()))
    }

    async fn delete(&self, kind: ResourceKind, target: &ResourceRef) -> ApiResult<()> {
        self.log(format!("delete {}", describe(kind, target)))?;
        let mut state = self.state.lock().unwrap();
        if state.resources.remove(&key(kind, target)).is_none() {
            return Err(ApiError::not_found("not found"));
        }
        state
            .resources
            .retain(|(_, parent, _), _| parent.as_deref() != Some(target.id.as_str()));
        Ok(())
    }

    async fn update_project_setting(
        &self,
        project_id: &str,
        setting: &ProjectSetting,
    ) -> ApiResult<()> {
        self.log(format!("update_project_setting {setting:?}"))?;
        let mut state = self.state.lock().unwrap();
        let target = ResourceRef::new(project_id);
        let Some(Value::Object(project)) = state.resources.get_mut(&key(ResourceKind::Project, &target))
        else {
            return Err(ApiError::not_found("project not found"));
        };
        match setting {
            ProjectSetting::Service { name, enabled } => {
                project.insert(format!("serviceStatusFor{}", upper_first(name)), json!(enabled));
            }
            ProjectSetting::AuthMethod { name, enabled } => {
                project.insert(format!("auth{}", upper_first(name)), json!(enabled));
            }
            ProjectSetting::AuthSecurity { name, value } => {
                let field = SECURITY_FIELDS
                    .iter()
                    .find(|(local, _)| *local == name.as_str())
                    .map(|(_, remote)| remote.to_string())
                    .unwrap_or_else(|| name.clone());
                project.insert(field, value.clone());
            }
        }
        Ok(())
    }

    async fn create_deployment(
        &self,
        kind: DeployKind,
        resource_id: &str,
        source: DeploymentSource,
    ) -> ApiResult<Value> {
        self.log(format!("create_deployment {} {}", kind.rule_type(), resource_id))?;
        if source.archive.is_empty() {
            return Err(ApiError::status(400, "invalid_code", "empty archive"));
        }
        let mut state = self.state.lock().unwrap();
        state.deployments += 1;
        if state.anonymous_deployments {
            return Ok(json!({ "status": "waiting" }));
        }
        Ok(json!({ "$id": format!("deployment-{}", state.deployments), "status": "waiting" }))
    }

    async fn get_deployment(
        &self,
        kind: DeployKind,
        resource_id: &str,
        deployment_id: &str,
    ) -> ApiResult<Value> {
        self.log(format!(
            "get_deployment {} {} {}",
            kind.rule_type(),
            resource_id,
            deployment_id
        ))?;
        let mut state = self.state.lock().unwrap();
        state.deployment_polls += 1;
        let status = state.deployment_status.clone().unwrap_or_else(|| "ready".into());
        Ok(json!({ "$id": deployment_id, "status": status }))
    }

    async fn list_variables(
        &self,
        kind: DeployKind,
        resource_id: &str,
    ) -> ApiResult<Vec<Variable>> {
        self.log(format!("list_variables {} {}", kind.rule_type(), resource_id))?;
        let state = self.state.lock().unwrap();
        Ok(state
            .variables
            .iter()
            .filter(|(owner, _)| owner == resource_id)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn create_variable(
        &self,
        kind: DeployKind,
        resource_id: &str,
        key: &str,
        _value: &str,
    ) -> ApiResult<()> {
        self.log(format!("create_variable {} {} {}", kind.rule_type(), resource_id, key))?;
        let mut state = self.state.lock().unwrap();
        let id = format!("var-{}", state.variables.len() + 1);
        state.variables.push((
            resource_id.to_string(),
            Variable {
                id,
                key: key.to_string(),
            },
        ));
        Ok(())
    }

    async fn delete_variable(
        &self,
        kind: DeployKind,
        resource_id: &str,
        variable_id: &str,
    ) -> ApiResult<()> {
        self.log(format!(
            "delete_variable {} {} {}",
            kind.rule_type(),
            resource_id,
            variable_id
        ))?;
        let mut state = self.state.lock().unwrap();
        state
            .variables
            .retain(|(owner, v)| !(owner == resource_id && v.id == variable_id));
        Ok(())
    }

    async fn create_column(&self, table: &SchemaRef, column: &Column) -> ApiResult<()> {
        self.log(format!("create_column {}.{}", table.table_id, column.key))?;
        self.with_definitions(table, table.schema.columns_key(), |items, statuses| {
            if find_definition(items, &column.key).is_ok() {
                return Err(ApiError::status(409, "column_already_exists", "duplicate column"));
            }
            let mut value = serde_json::to_value(column).map_err(|e| ApiError::Decode(e.to_string()))?;
            let status = statuses
                .get(&column.key)
                .cloned()
                .unwrap_or_else(|| "available".into());
            value["status"] = json!(status);
            items.push(value);
            Ok(())
        })
    }

    async fn get_column(&self, table: &SchemaRef, key: &str) -> ApiResult<Value> {
        self.log(format!("get_column {}.{}", table.table_id, key))?;
        self.with_definitions(table, table.schema.columns_key(), |items, statuses| {
            let mut column = find_definition(items, key)?;
            if let Some(status) = statuses.get(key) {
                column["status"] = json!(status);
            }
            Ok(column)
        })
    }

    async fn delete_column(&self, table: &SchemaRef, key: &str) -> ApiResult<()> {
        self.log(format!("delete_column {}.{}", table.table_id, key))?;
        self.with_definitions(table, table.schema.columns_key(), |items, _| {
            remove_definition(items, key)
        })
    }

    async fn create_index(&self, table: &SchemaRef, index: &Index) -> ApiResult<()> {
        self.log(format!("create_index {}.{}", table.table_id, index.key))?;
        self.with_definitions(table, "indexes", |items, _| {
            if find_definition(items, &index.key).is_ok() {
                return Err(ApiError::status(409, "index_already_exists", "duplicate index"));
            }
            let mut value = serde_json::to_value(index).map_err(|e| ApiError::Decode(e.to_string()))?;
            value["status"] = json!("available");
            items.push(value);
            Ok(())
        })
    }

    async fn get_index(&self, table: &SchemaRef, key: &str) -> ApiResult<Value> {
        self.log(format!("get_index {}.{}", table.table_id, key))?;
        self.with_definitions(table, "indexes", |items, _| find_definition(items, key))
    }

    async fn delete_index(&self, table: &SchemaRef, key: &str) -> ApiResult<()> {
        self.log(format!("delete_index {}.{}", table.table_id, key))?;
        self.with_definitions(table, "indexes", |items, _| remove_definition(items, key))
    }

    async fn console_variables(&self) -> ApiResult<Value> {
        self.log("console_variables".to_string())?;
        Ok(json!({
            "_APP_DOMAIN_FUNCTIONS": "functions.example.app",
            "_APP_DOMAIN_SITES": "sites.example.app"
        }))
    }

    async fn create_rule(
        &self,
        kind: DeployKind,
        domain: &str,
        resource_id: &str,
    ) -> ApiResult<Value> {
        self.log(format!("create_rule {} {}", kind.rule_type(), resource_id))?;
        let rule = json!({
            "domain": domain,
            "deploymentResourceType": kind.rule_type(),
            "deploymentResourceId": resource_id
        });
        self.state.lock().unwrap().rules.push(rule.clone());
        Ok(rule)
    }

    async fn list_rules(&self, queries: &[String]) -> ApiResult<Vec<Value>> {
        self.log("list_rules".to_string())?;
        let state = self.state.lock().unwrap();
        Ok(state
            .rules
            .iter()
            .filter(|rule| {
                let id = rule["deploymentResourceId"].as_str().unwrap_or_default();
                queries.iter().any(|q| q.contains(&format!("\"{id}\"")))
            })
            .cloned()
            .collect())
    }
}

/// Answers prompts from a script and counts how often it was asked.
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    selections: Mutex<VecDeque<Vec<usize>>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            selections: Mutex::new(VecDeque::new()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Queue an answer for the next `select`/`multi_select`.
    pub fn with_selection(self, picked: &[usize]) -> Self {
        self.selections.lock().unwrap().push_back(picked.to_vec());
        self
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }

    fn next(&self, prompt: &str) -> Result<String> {
        self.asked.lock().unwrap().push(prompt.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("unexpected prompt: {prompt}"))
    }
}

impl Prompter for ScriptedPrompter {
    fn text(&self, prompt: &str) -> Result<String> {
        self.next(prompt)
    }

    fn input(&self, prompt: &str, _default: Option<&str>) -> Result<String> {
        self.next(prompt)
    }

    fn select(&self, prompt: &str, _items: &[String]) -> Result<usize> {
        self.asked.lock().unwrap().push(prompt.to_string());
        let picked = self.selections.lock().unwrap().pop_front().unwrap_or_default();
        Ok(picked.first().copied().unwrap_or(0))
    }

    fn multi_select(&self, prompt: &str, _items: &[String]) -> Result<Vec<usize>> {
        self.asked.lock().unwrap().push(prompt.to_string());
        Ok(self.selections.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// Options for tests: every record, no prompts for selection, no poll delay.
pub fn options() -> PushOptions {
    PushOptions {
        all: true,
        poll_interval: Duration::ZERO,
        ..PushOptions::default()
    }
}

pub fn context<'a>(
    api: &'a MockApi,
    prompter: &'a ScriptedPrompter,
    options: PushOptions,
) -> PushContext<'a> {
    PushContext {
        api,
        prompter,
        options,
        project_id: "demo".to_string(),
        console_url: "https://cloud.appwrite.io/console".to_string(),
    }
}

pub fn store(config: Value) -> ConfigStore {
    ConfigStore::in_memory(config).unwrap()
}

/// Write `config` as the project file in `dir` and load it.
pub fn store_on_disk(dir: &Path, config: &Value) -> ConfigStore {
    let path = dir.join("appwrite.config.json");
    std::fs::write(&path, serde_json::to_string_pretty(config).unwrap()).unwrap();
    ConfigStore::load(&path).unwrap()
}
