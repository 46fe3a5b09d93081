use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::query;
use super::{
    ApiError, ApiResult, DeployKind, DeploymentSource, ProjectSetting, ResourceApi, ResourceKind,
    ResourceRef, SchemaRef, Variable,
};
use crate::context::ClientConfig;
use crate::schema::{Column, Index};

const RESPONSE_FORMAT: &str = "1.8.0";
const PAGE_SIZE: u32 = 100;

/// Client for the Appwrite REST API, authenticated with a project API key.
pub struct HttpResourceApi {
    client: reqwest::Client,
    endpoint: String,
    project_id: String,
    api_key: String,
}

impl HttpResourceApi {
    /// Create a new client for `project_id`.
    pub fn new(config: &ClientConfig, project_id: &str) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.self_signed)
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.endpoint, path))
            .header("X-Appwrite-Project", &self.project_id)
            .header("X-Appwrite-Key", &self.api_key)
            .header("X-Appwrite-Response-Format", RESPONSE_FORMAT)
    }

    async fn send(&self, builder: RequestBuilder) -> ApiResult<Value> {
        let response = builder.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let text = response.text().await?;
        if !status.is_success() {
            let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
            return Err(ApiError::status(
                status.as_u16(),
                body.get("type").and_then(Value::as_str).unwrap_or("unknown"),
                body.get("message")
                    .and_then(Value::as_str)
                    .unwrap_or(status.canonical_reason().unwrap_or("request failed")),
            ));
        }
        if text.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> ApiResult<Value> {
        debug!(%method, path, "appwrite request");
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(&outgoing(body));
        }
        self.send(builder).await
    }

    async fn list_path(&self, path: &str, key: &str, queries: &[String]) -> ApiResult<Vec<Value>> {
        let mut items = Vec::new();
        let mut offset = 0u32;
        loop {
            let mut params: Vec<(&str, String)> =
                queries.iter().map(|q| ("queries[]", q.clone())).collect();
            params.push(("queries[]", query::limit(PAGE_SIZE)));
            params.push(("queries[]", query::offset(offset)));

            debug!(path, offset, "appwrite list");
            let page = self
                .send(self.request(Method::GET, path).query(&params))
                .await?;
            let batch = page
                .get(key)
                .and_then(Value::as_array)
                .cloned()
                .ok_or_else(|| ApiError::Decode(format!("missing '{key}' in list response")))?;
            let done = batch.len() < PAGE_SIZE as usize;
            items.extend(batch);
            if done {
                return Ok(items);
            }
            offset += PAGE_SIZE;
        }
    }

    fn columns_path(&self, table: &SchemaRef) -> String {
        format!(
            "{}/{}",
            table.table_ref().path(table.schema.entity_kind()),
            table.schema.columns_key()
        )
    }

    fn indexes_path(&self, table: &SchemaRef) -> String {
        format!("{}/indexes", table.table_ref().path(table.schema.entity_kind()))
    }
}

/// Remote snapshots carry `$permissions`; write calls take `permissions`.
fn outgoing(mut body: Value) -> Value {
    if let Value::Object(map) = &mut body {
        if let Some(permissions) = map.remove("$permissions") {
            map.insert("permissions".into(), permissions);
        }
    }
    body
}

fn column_body(table: &SchemaRef, column: &Column) -> Value {
    let mut body = Map::new();
    body.insert("key".into(), json!(column.key));
    if column.is_relationship() {
        body.insert(
            table.schema.related_field().into(),
            json!(column.related_table),
        );
        body.insert("type".into(), json!(column.relation_type));
        body.insert("twoWay".into(), json!(column.two_way.unwrap_or(false)));
        if let Some(key) = &column.two_way_key {
            body.insert("twoWayKey".into(), json!(key));
        }
        if let Some(on_delete) = &column.on_delete {
            body.insert("onDelete".into(), json!(on_delete));
        }
        return Value::Object(body);
    }

    body.insert("required".into(), json!(column.required));
    if let Some(default) = &column.default {
        body.insert("default".into(), default.clone());
    }
    if let Some(array) = column.array {
        body.insert("array".into(), json!(array));
    }
    if let Some(size) = column.size {
        body.insert("size".into(), json!(size));
    }
    if let Some(min) = &column.min {
        body.insert("min".into(), Value::Number(min.clone()));
    }
    if let Some(max) = &column.max {
        body.insert("max".into(), Value::Number(max.clone()));
    }
    if let Some(elements) = &column.elements {
        body.insert("elements".into(), json!(elements));
    }
    if let Some(encrypt) = column.encrypt {
        body.insert("encrypt".into(), json!(encrypt));
    }
    Value::Object(body)
}

/// `emailPassword` -> `email-password`.
fn kebab(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Endpoint suffix and body for a project setting.
fn project_setting_request(setting: &ProjectSetting) -> (String, Value) {
    match setting {
        ProjectSetting::Service { name, enabled } => (
            "service".to_string(),
            json!({ "service": name, "status": enabled }),
        ),
        ProjectSetting::AuthMethod { name, enabled } => {
            (format!("auth/{}", kebab(name)), json!({ "status": enabled }))
        }
        ProjectSetting::AuthSecurity { name, value } => {
            let (segment, field) = match name.as_str() {
                "duration" => ("duration", "duration"),
                "limit" => ("limit", "limit"),
                "sessionsLimit" => ("max-sessions", "limit"),
                "passwordHistory" => ("password-history", "limit"),
                "passwordDictionary" => ("password-dictionary", "enabled"),
                "personalDataCheck" => ("personal-data", "enabled"),
                "sessionAlerts" => ("session-alerts", "alerts"),
                "mockNumbers" => ("mock-numbers", "numbers"),
                other => (other, other),
            };
            let mut body = Map::new();
            body.insert(field.to_string(), value.clone());
            (format!("auth/{segment}"), Value::Object(body))
        }
    }
}

#[async_trait]
impl ResourceApi for HttpResourceApi {
    async fn get(&self, kind: ResourceKind, target: &ResourceRef) -> ApiResult<Value> {
        self.call(Method::GET, &target.path(kind), None).await
    }

    async fn list(
        &self,
        kind: ResourceKind,
        parent: Option<&str>,
        queries: &[String],
    ) -> ApiResult<Vec<Value>> {
        self.list_path(&kind.collection_path(parent), kind.list_key(), queries)
            .await
    }

    async fn create(
        &self,
        kind: ResourceKind,
        target: &ResourceRef,
        mut body: Value,
    ) -> ApiResult<Value> {
        if let Value::Object(map) = &mut body {
            map.insert(kind.id_field().to_string(), json!(target.id));
        }
        self.call(
            Method::POST,
            &kind.collection_path(target.parent.as_deref()),
            Some(body),
        )
        .await
    }

    async fn update(
        &self,
        kind: ResourceKind,
        target: &ResourceRef,
        body: Value,
    ) -> ApiResult<Value> {
        let method = if kind.updates_with_put() {
            Method::PUT
        } else {
            Method::PATCH
        };
        self.call(method, &target.path(kind), Some(body)).await
    }

    async fn delete(&self, kind: ResourceKind, target: &ResourceRef) -> ApiResult<()> {
        self.call(Method::DELETE, &target.path(kind), None).await?;
        Ok(())
    }

    async fn update_project_setting(
        &self,
        project_id: &str,
        setting: &ProjectSetting,
    ) -> ApiResult<()> {
        let (suffix, body) = project_setting_request(setting);
        self.call(
            Method::PATCH,
            &format!("/projects/{project_id}/{suffix}"),
            Some(body),
        )
        .await?;
        Ok(())
    }

    async fn create_deployment(
        &self,
        kind: DeployKind,
        resource_id: &str,
        source: DeploymentSource,
    ) -> ApiResult<Value> {
        let path = format!(
            "{}/deployments",
            ResourceRef::new(resource_id).path(kind.resource_kind())
        );
        let code = reqwest::multipart::Part::bytes(source.archive)
            .file_name("code.tar.gz")
            .mime_str("application/gzip")?;
        let mut form = reqwest::multipart::Form::new()
            .part("code", code)
            .text("activate", source.activate.to_string());
        let optional = [
            ("entrypoint", source.entrypoint),
            ("commands", source.commands),
            ("installCommand", source.install_command),
            ("buildCommand", source.build_command),
            ("outputDirectory", source.output_directory),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                form = form.text(name, value);
            }
        }

        debug!(path, "uploading deployment");
        self.send(self.request(Method::POST, &path).multipart(form))
            .await
    }

    async fn get_deployment(
        &self,
        kind: DeployKind,
        resource_id: &str,
        deployment_id: &str,
    ) -> ApiResult<Value> {
        let path = format!(
            "{}/deployments/{deployment_id}",
            ResourceRef::new(resource_id).path(kind.resource_kind())
        );
        self.call(Method::GET, &path, None).await
    }

    async fn list_variables(
        &self,
        kind: DeployKind,
        resource_id: &str,
    ) -> ApiResult<Vec<Variable>> {
        let path = format!(
            "{}/variables",
            ResourceRef::new(resource_id).path(kind.resource_kind())
        );
        let items = self.list_path(&path, "variables", &[]).await?;
        Ok(items
            .iter()
            .map(|v| Variable {
                id: v.get("$id").and_then(Value::as_str).unwrap_or_default().to_string(),
                key: v.get("key").and_then(Value::as_str).unwrap_or_default().to_string(),
            })
            .collect())
    }

    async fn create_variable(
        &self,
        kind: DeployKind,
        resource_id: &str,
        key: &str,
        value: &str,
    ) -> ApiResult<()> {
        let path = format!(
            "{}/variables",
            ResourceRef::new(resource_id).path(kind.resource_kind())
        );
        self.call(Method::POST, &path, Some(json!({ "key": key, "value": value })))
            .await?;
        Ok(())
    }

    async fn delete_variable(
        &self,
        kind: DeployKind,
        resource_id: &str,
        variable_id: &str,
    ) -> ApiResult<()> {
        let path = format!(
            "{}/variables/{variable_id}",
            ResourceRef::new(resource_id).path(kind.resource_kind())
        );
        self.call(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn create_column(&self, table: &SchemaRef, column: &Column) -> ApiResult<()> {
        let path = format!("{}/{}", self.columns_path(table), column.endpoint_type());
        self.call(Method::POST, &path, Some(column_body(table, column)))
            .await?;
        Ok(())
    }

    async fn get_column(&self, table: &SchemaRef, key: &str) -> ApiResult<Value> {
        let path = format!("{}/{key}", self.columns_path(table));
        self.call(Method::GET, &path, None).await
    }

    async fn delete_column(&self, table: &SchemaRef, key: &str) -> ApiResult<()> {
        let path = format!("{}/{key}", self.columns_path(table));
        self.call(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn create_index(&self, table: &SchemaRef, index: &Index) -> ApiResult<()> {
        let mut body = json!({ "key": index.key, "type": index.kind });
        if let Value::Object(map) = &mut body {
            map.insert(
                table.schema.index_columns_field().to_string(),
                json!(index.columns),
            );
            if let Some(orders) = &index.orders {
                map.insert("orders".into(), json!(orders));
            }
        }
        self.call(Method::POST, &self.indexes_path(table), Some(body))
            .await?;
        Ok(())
    }

    async fn get_index(&self, table: &SchemaRef, key: &str) -> ApiResult<Value> {
        let path = format!("{}/{key}", self.indexes_path(table));
        self.call(Method::GET, &path, None).await
    }

    async fn delete_index(&self, table: &SchemaRef, key: &str) -> ApiResult<()> {
        let path = format!("{}/{key}", self.indexes_path(table));
        self.call(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn console_variables(&self) -> ApiResult<Value> {
        self.call(Method::GET, "/console/variables", None).await
    }

    async fn create_rule(
        &self,
        kind: DeployKind,
        domain: &str,
        resource_id: &str,
    ) -> ApiResult<Value> {
        let id_field = kind.resource_kind().id_field();
        let mut body = json!({ "domain": domain });
        if let Value::Object(map) = &mut body {
            map.insert(id_field.to_string(), json!(resource_id));
        }
        self.call(
            Method::POST,
            &format!("/proxy/rules/{}", kind.rule_type()),
            Some(body),
        )
        .await
    }

    async fn list_rules(&self, queries: &[String]) -> ApiResult<Vec<Value>> {
        self.list_path("/proxy/rules", "rules", queries).await
    }
}
