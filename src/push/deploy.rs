//! Shared pusher for deployable resources (functions and sites).
//!
//! Each resource is upserted, optionally has its variables refreshed, and
//! then gets a new deployment built from its local source directory. Remote
//! build status is polled under the Attempt Budget; failed and timed-out
//! deployments are collected and listed with console links at the end.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use futures::future::join_all;
use serde_json::json;
use tracing::{debug, warn};

use super::budget::{poll_until, PollOutcome, PollState};
use super::changes::{detect_changes, diff_fields};
use super::confirm::confirm_changes;
use super::package::package_directory;
use super::variables::refresh_variables;
use super::{
    print_empty_hint, resolve_selection, DeploymentFailure, FailedDeployment, PushContext,
    PushError, PushKind, PushSummary, ResourceFailure,
};
use crate::api::{query, str_field, ApiError, DeployKind, DeploymentSource};
use crate::config::ConfigStore;
use crate::models::Tracked;

/// A field that must be set before a resource can be deployed unattended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredField {
    pub field: &'static str,
    pub prompt: String,
    pub default: Option<String>,
}

/// A locally declared resource with code that can be deployed.
pub trait Deployable: Tracked + Clone {
    const DEPLOY: DeployKind;
    const PUSH_KIND: PushKind;
    /// Project config key holding these records.
    const CONFIG_KEY: &'static str;
    /// Immutable field that must match the remote.
    const IDENTITY_FIELD: &'static str;
    /// Console variable naming the domain new rules are allocated under.
    const DOMAIN_VARIABLE: &'static str;

    fn load(store: &ConfigStore) -> Result<Vec<Self>>;

    fn identity(&self) -> &str;

    /// Source directory, relative to the project root.
    fn source_path(&self) -> &str;

    fn ignored(&self) -> &[String];

    fn deployment_source(&self, archive: Vec<u8>) -> DeploymentSource;

    /// Path of a deployment page below `/project-<id>` in the console.
    fn console_path(&self, deployment_id: &str) -> String;

    /// The first required field this record lacks, if any.
    fn missing_field(&self) -> Option<RequiredField> {
        None
    }
}

/// Outcome of pushing one resource.
#[derive(Debug)]
enum Applied {
    Pushed,
    Deployed { url: Option<String> },
    DeployFailed(FailedDeployment),
}

pub async fn push_deployables<D: Deployable>(
    ctx: &PushContext<'_>,
    store: &mut ConfigStore,
) -> Result<PushSummary> {
    let noun = D::PUSH_KIND.name();
    let mut summary = PushSummary::new(D::KIND.label());
    summary.deployable = true;

    let selection = ctx.options.selection(D::PUSH_KIND);
    let mut selected = resolve_selection(
        ctx.prompter,
        &selection,
        noun,
        D::load(store)?,
        |r| r.id(),
        |r| r.label(),
    )?;
    if selected.is_empty() {
        print_empty_hint(noun);
        return Ok(summary);
    }

    if ctx.options.code && backfill_required(ctx, store, &selected)? {
        store.save()?;
        let ids: Vec<String> = selected.iter().map(|r| r.id().to_string()).collect();
        selected = D::load(store)?
            .into_iter()
            .filter(|r| ids.iter().any(|id| id == r.id()))
            .collect();
    }

    let changes = detect_changes(ctx.api, &selected, &[]).await?;
    if !confirm_changes(ctx.prompter, ctx.options.force, &changes)? {
        return Ok(summary);
    }

    let root = store.root();
    let results = join_all(selected.iter().map(|record| {
        let root = &root;
        async move { (record, apply(ctx, root, record).await) }
    }))
    .await;

    for (record, result) in results {
        match result {
            Ok(Applied::Pushed) => summary.pushed += 1,
            Ok(Applied::Deployed { url }) => {
                summary.pushed += 1;
                summary.deployed += 1;
                match url {
                    Some(url) => println!(
                        "{} Deployed {} {}",
                        "OK".green().bold(),
                        record.name().bold(),
                        url.cyan()
                    ),
                    None => println!("{} Deployed {}", "OK".green().bold(), record.name().bold()),
                }
            }
            Ok(Applied::DeployFailed(failed)) => {
                summary.pushed += 1;
                summary.failed_deployments.push(failed);
            }
            Err(error) => summary.failures.push(ResourceFailure {
                id: record.id().to_string(),
                error,
            }),
        }
    }
    Ok(summary)
}

/// Prompt for required fields the selected records lack and persist the
/// answers. Returns whether the store changed.
fn backfill_required<D: Deployable>(
    ctx: &PushContext<'_>,
    store: &mut ConfigStore,
    records: &[D],
) -> Result<bool> {
    let mut changed = false;
    for record in records {
        let Some(required) = record.missing_field() else {
            continue;
        };
        let answer = ctx
            .prompter
            .input(&required.prompt, required.default.as_deref())?;
        let answer = answer.trim();
        if answer.is_empty() {
            continue;
        }
        if store.set_field(D::CONFIG_KEY, record.id(), required.field, json!(answer)) {
            debug!(id = record.id(), field = required.field, "backfilled");
            changed = true;
        }
    }
    Ok(changed)
}

async fn apply<D: Deployable>(ctx: &PushContext<'_>, root: &Path, record: &D) -> Result<Applied> {
    let kind = D::KIND;
    let target = record.resource_ref();
    println!(
        "{} Pushing {} {} ...",
        ">".cyan().bold(),
        D::PUSH_KIND.name(),
        record.name().bold()
    );

    match ctx.api.get(kind, &target).await {
        Ok(remote) => {
            let remote_identity = str_field(&remote, D::IDENTITY_FIELD).unwrap_or_default();
            if remote_identity != record.identity() {
                return Err(PushError::IdentityMismatch {
                    kind: D::PUSH_KIND.name(),
                    id: record.id().to_string(),
                    field: D::IDENTITY_FIELD,
                    local: record.identity().to_string(),
                    remote: remote_identity.to_string(),
                }
                .into());
            }
            if !diff_fields(record.id(), &record.fields(), &remote, &[]).is_empty() {
                ctx.api
                    .update(kind, &target, record.body())
                    .await
                    .context("Failed to update")?;
                println!("{} Updated {}", "~".yellow().bold(), record.id().bold());
            }
        }
        Err(e) if e.is_not_found() => {
            ctx.api
                .create(kind, &target, record.body())
                .await
                .context("Failed to create")?;
            println!("{} Created {}", "+".green().bold(), record.id().bold());
            bootstrap_rule::<D>(ctx, record.id()).await?;
        }
        Err(e) => return Err(anyhow::Error::new(e).context("Failed to fetch remote")),
    }

    let dir = resolve_source(root, record.source_path());
    if ctx.options.with_variables {
        let created = refresh_variables(ctx.api, D::DEPLOY, record.id(), &dir).await?;
        println!(
            "{} Replaced variables of {} ({created} from {})",
            "~".yellow().bold(),
            record.id().bold(),
            super::variables::ENV_FILE
        );
    }

    if !ctx.options.code {
        return Ok(Applied::Pushed);
    }

    let archive = package_directory(&dir, record.ignored()).map_err(|e| PushError::Packaging {
        id: record.id().to_string(),
        message: format!("{e:#}"),
    })?;
    let deployment = ctx
        .api
        .create_deployment(D::DEPLOY, record.id(), record.deployment_source(archive))
        .await
        .context("Failed to create deployment")?;
    let deployment_id = str_field(&deployment, "$id")
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Decode("deployment response has no $id".into()))
        .context("Failed to create deployment")?;
    debug!(id = record.id(), deployment = %deployment_id, "deployment created");

    if ctx.options.async_deploy {
        return Ok(Applied::Deployed { url: None });
    }

    let mut budget = ctx.budget();
    let outcome = poll_until(&mut budget, ctx.options.poll_interval, || {
        let deployment_id = deployment_id.as_str();
        async move {
            let remote = ctx
                .api
                .get_deployment(D::DEPLOY, record.id(), deployment_id)
                .await?;
            Ok::<_, ApiError>(match str_field(&remote, "status").unwrap_or_default() {
                "ready" => PollState::Ready(()),
                "failed" | "canceled" => PollState::Failed(()),
                _ => PollState::Pending,
            })
        }
    })
    .await
    .context("Failed to check deployment status")?;

    let reason = match outcome {
        PollOutcome::Ready(()) => {
            return Ok(Applied::Deployed {
                url: public_url(ctx, D::DEPLOY, record.id()).await,
            })
        }
        PollOutcome::Failed(()) => DeploymentFailure::Remote,
        PollOutcome::TimedOut { attempts } => DeploymentFailure::TimedOut { attempts },
    };
    println!(
        "{} Deployment of {} did not become ready",
        "!".yellow().bold(),
        record.name().bold()
    );
    Ok(Applied::DeployFailed(FailedDeployment {
        id: record.id().to_string(),
        name: record.name().to_string(),
        console_url: format!(
            "{}/project-{}/{}",
            ctx.console_url,
            ctx.project_id,
            record.console_path(&deployment_id)
        ),
        deployment_id,
        reason,
    }))
}

fn resolve_source(root: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Subdomain for a freshly created resource: its ID plus a time-derived suffix.
pub fn subdomain(id: &str, now: DateTime<Utc>) -> String {
    let slug: String = id
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("{}-{:x}", slug.trim_matches('-'), now.timestamp_millis())
}

/// Register a routing rule for a new resource under the project's domain.
async fn bootstrap_rule<D: Deployable>(ctx: &PushContext<'_>, id: &str) -> Result<()> {
    let bootstrap_error = |message: String| PushError::Bootstrap {
        id: id.to_string(),
        message,
    };
    let variables = ctx
        .api
        .console_variables()
        .await
        .map_err(|e| bootstrap_error(e.to_string()))?;
    let Some(domain) = str_field(&variables, D::DOMAIN_VARIABLE).filter(|d| !d.is_empty()) else {
        debug!(id, "no domain configured, skipping rule");
        return Ok(());
    };
    let host = format!("{}.{}", subdomain(id, Utc::now()), domain);
    ctx.api
        .create_rule(D::DEPLOY, &host, id)
        .await
        .map_err(|e| bootstrap_error(e.to_string()))?;
    println!("{} Allocated https://{}", "+".green().bold(), host);
    Ok(())
}

/// First routing rule pointing at the resource, as an HTTPS URL.
async fn public_url(ctx: &PushContext<'_>, kind: DeployKind, id: &str) -> Option<String> {
    let queries = [
        query::equal("deploymentResourceType", kind.rule_type()),
        query::equal("deploymentResourceId", id),
    ];
    match ctx.api.list_rules(&queries).await {
        Ok(rules) => rules
            .iter()
            .find_map(|rule| str_field(rule, "domain"))
            .map(|domain| format!("https://{domain}")),
        Err(e) => {
            warn!(id, error = %e, "failed to look up public URL");
            None
        }
    }
}
