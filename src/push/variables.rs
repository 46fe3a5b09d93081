//! Replace a deployable resource's remote variables with its local `.env` file.

use std::path::Path;

use anyhow::{Context, Result};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::api::{DeployKind, ResourceApi};

pub const ENV_FILE: &str = ".env";

/// Parse `path` as a dotenv file. A missing or unparseable file yields no variables.
pub fn read_env_file(path: &Path) -> Vec<(String, String)> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no variables file");
            return Vec::new();
        }
    };
    match iter.collect::<Result<Vec<_>, _>>() {
        Ok(vars) => vars,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unparseable variables file");
            Vec::new()
        }
    }
}

/// Delete every remote variable of the resource, then create one per entry
/// of `<dir>/.env`. Returns how many variables were created.
pub async fn refresh_variables(
    api: &dyn ResourceApi,
    kind: DeployKind,
    resource_id: &str,
    dir: &Path,
) -> Result<usize> {
    let existing = api
        .list_variables(kind, resource_id)
        .await
        .context("Failed to list variables")?;
    let deletions = join_all(existing.iter().map(|var| async move {
        api.delete_variable(kind, resource_id, &var.id)
            .await
            .with_context(|| format!("Failed to delete variable '{}'", var.key))
    }))
    .await;
    for result in deletions {
        result?;
    }

    let vars = read_env_file(&dir.join(ENV_FILE));
    let creations = join_all(
        vars.iter()
            .map(|(key, value)| api.create_variable(kind, resource_id, key, value)),
    )
    .await;
    for result in creations {
        result.context("Failed to create variable")?;
    }
    debug!(resource = resource_id, removed = existing.len(), created = vars.len(), "variables refreshed");
    Ok(vars.len())
}
