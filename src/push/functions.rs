use anyhow::Result;

use super::deploy::{push_deployables, Deployable, RequiredField};
use super::{PushContext, PushKind, PushSummary};
use crate::api::{DeployKind, DeploymentSource};
use crate::config::{self, ConfigStore};
use crate::models::Function;

impl Deployable for Function {
    const DEPLOY: DeployKind = DeployKind::Function;
    const PUSH_KIND: PushKind = PushKind::Functions;
    const CONFIG_KEY: &'static str = config::FUNCTIONS;
    const IDENTITY_FIELD: &'static str = "runtime";
    const DOMAIN_VARIABLE: &'static str = "_APP_DOMAIN_FUNCTIONS";

    fn load(store: &ConfigStore) -> Result<Vec<Self>> {
        store.get_functions()
    }

    fn identity(&self) -> &str {
        &self.runtime
    }

    fn source_path(&self) -> &str {
        &self.path
    }

    fn ignored(&self) -> &[String] {
        &self.ignore
    }

    fn deployment_source(&self, archive: Vec<u8>) -> DeploymentSource {
        DeploymentSource {
            archive,
            activate: true,
            entrypoint: self.entrypoint.clone(),
            commands: self.commands.clone(),
            ..DeploymentSource::default()
        }
    }

    fn console_path(&self, deployment_id: &str) -> String {
        format!("functions/function-{}/deployment-{deployment_id}", self.id)
    }

    fn missing_field(&self) -> Option<RequiredField> {
        if self.entrypoint.as_deref().is_some_and(|e| !e.trim().is_empty()) {
            return None;
        }
        Some(RequiredField {
            field: "entrypoint",
            prompt: format!("Entrypoint for function '{}' (e.g. src/main.js)", self.id),
            default: None,
        })
    }
}

pub async fn push_functions(ctx: &PushContext<'_>, store: &mut ConfigStore) -> Result<PushSummary> {
    push_deployables::<Function>(ctx, store).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn function(entrypoint: Option<&str>) -> Function {
        serde_json::from_value(json!({
            "$id": "api",
            "name": "API",
            "runtime": "node-18.0",
            "entrypoint": entrypoint,
            "path": "functions/api"
        }))
        .unwrap()
    }

    #[test]
    fn test_missing_entrypoint_is_required() {
        let required = function(None).missing_field().unwrap();
        assert_eq!(required.field, "entrypoint");
        assert!(function(Some("src/main.js")).missing_field().is_none());
        assert!(function(Some("  ")).missing_field().is_some());
    }

    #[test]
    fn test_console_path() {
        assert_eq!(
            function(None).console_path("d1"),
            "functions/function-api/deployment-d1"
        );
    }

    #[test]
    fn test_deployment_source_carries_entrypoint() {
        let source = function(Some("src/main.js")).deployment_source(vec![1, 2]);
        assert!(source.activate);
        assert_eq!(source.entrypoint.as_deref(), Some("src/main.js"));
        assert!(source.output_directory.is_none());
    }
}
