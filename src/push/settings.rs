//! Project name, service toggles and auth settings.

use anyhow::{Context, Result};
use colored::Colorize;
use futures::future::join_all;
use serde_json::{json, Map, Value};

use super::changes::{diff_fields, ChangeRecord};
use super::confirm::confirm_changes;
use super::{PushContext, PushSummary, ResourceFailure};
use crate::api::{ProjectSetting, ResourceKind, ResourceRef};
use crate::config::ConfigStore;
use crate::models::ProjectSettings;

pub async fn push_settings(ctx: &PushContext<'_>, store: &mut ConfigStore) -> Result<PushSummary> {
    let mut summary = PushSummary::new(ResourceKind::Project.label());
    let project = store.get_project()?;
    if project.name.is_none() && project.settings.is_none() {
        println!(
            "{} No project settings found in the project config. Use {} to synchronize them.",
            "!".yellow().bold(),
            "appwrite pull settings".cyan()
        );
        return Ok(summary);
    }

    let target = ResourceRef::new(&ctx.project_id);
    let remote = ctx
        .api
        .get(ResourceKind::Project, &target)
        .await
        .context("Failed to fetch remote project")?;

    let mut changes = Vec::new();
    if let Some(name) = &project.name {
        let mut local = Map::new();
        local.insert("name".into(), json!(name));
        changes.extend(diff_fields(&ctx.project_id, &local, &remote, &[]));
    }
    if let Some(settings) = &project.settings {
        changes.extend(settings_changes(&ctx.project_id, settings, &remote));
    }

    if !confirm_changes(ctx.prompter, ctx.options.force, &changes)? {
        return Ok(summary);
    }

    let target = &target;
    let results = join_all(changes.iter().map(|change| async move {
        let result = match change.key.as_str() {
            "name" => ctx
                .api
                .update(ResourceKind::Project, target, json!({ "name": change.local }))
                .await
                .map(|_| ()),
            key => match setting_for(key, &change.local) {
                Some(setting) => ctx.api.update_project_setting(&ctx.project_id, &setting).await,
                None => Ok(()),
            },
        };
        (change, result)
    }))
    .await;

    let mut failed = false;
    for (change, result) in results {
        match result {
            Ok(()) => println!("{} Updated {}", "~".yellow().bold(), change.key.bold()),
            Err(e) => {
                failed = true;
                summary.failures.push(ResourceFailure {
                    id: change.key.clone(),
                    error: anyhow::Error::new(e).context("Failed to update project setting"),
                });
            }
        }
    }
    if !failed {
        summary.pushed = 1;
    }
    Ok(summary)
}

/// Diff declared settings against the remote project's shape.
fn settings_changes(project_id: &str, settings: &ProjectSettings, remote: &Value) -> Vec<ChangeRecord> {
    let local = match serde_json::to_value(settings) {
        Ok(Value::Object(map)) => map,
        _ => return Vec::new(),
    };
    let remote = serde_json::to_value(ProjectSettings::from_remote(remote)).unwrap_or(Value::Null);
    diff_fields(project_id, &local, &remote, &[])
}

/// Map a dotted settings key back to the call that applies it.
fn setting_for(key: &str, value: &Value) -> Option<ProjectSetting> {
    if let Some(name) = key.strip_prefix("services.") {
        return Some(ProjectSetting::Service {
            name: name.to_string(),
            enabled: value.as_bool()?,
        });
    }
    if let Some(name) = key.strip_prefix("auth.methods.") {
        return Some(ProjectSetting::AuthMethod {
            name: name.to_string(),
            enabled: value.as_bool()?,
        });
    }
    key.strip_prefix("auth.security.")
        .map(|name| ProjectSetting::AuthSecurity {
            name: name.to_string(),
            value: value.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_changes_use_dotted_keys() {
        let settings: ProjectSettings = serde_json::from_value(json!({
            "services": { "functions": false, "storage": true },
            "auth": { "security": { "duration": 3600 }, "methods": { "phone": true } }
        }))
        .unwrap();
        let remote = json!({
            "serviceStatusForFunctions": true,
            "serviceStatusForStorage": true,
            "authDuration": 3600,
            "authPhone": false
        });
        let changes = settings_changes("demo", &settings, &remote);
        let keys: Vec<_> = changes.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["services.functions", "auth.methods.phone"]);
    }

    #[test]
    fn test_setting_for_keys() {
        assert_eq!(
            setting_for("services.functions", &json!(false)),
            Some(ProjectSetting::Service {
                name: "functions".into(),
                enabled: false
            })
        );
        assert_eq!(
            setting_for("auth.security.limit", &json!(100)),
            Some(ProjectSetting::AuthSecurity {
                name: "limit".into(),
                value: json!(100)
            })
        );
        assert_eq!(setting_for("unknown", &json!(1)), None);
    }
}
