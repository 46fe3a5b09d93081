//! Reconcile the local project config against the remote project.
//!
//! [`push_resources`] dispatches to one pusher per [`PushKind`]. Each pusher
//! resolves its target set, runs change detection and the confirmation gate,
//! and then applies create/update/delete calls concurrently across resources,
//! capturing failures per resource so one bad resource never stops the rest.

pub mod budget;
pub mod changes;
pub mod columns;
pub mod confirm;
pub mod deploy;
pub mod functions;
pub mod package;
pub mod settings;
pub mod sites;
pub mod standard;
pub mod tables;
pub mod variables;

use std::time::Duration;

use anyhow::{bail, Result};
use colored::Colorize;
use thiserror::Error;
use tracing::info;

use crate::api::ResourceApi;
use crate::config::ConfigStore;
use crate::prompt::Prompter;

use budget::DEFAULT_ATTEMPTS;

/// Errors that end a single resource's push (or, for containers, the run).
#[derive(Debug, Error)]
pub enum PushError {
    #[error("{field} mismatch for {kind} '{id}' (local: {local}, remote: {remote}). Delete the remote {kind} or update the project config.")]
    IdentityMismatch {
        kind: &'static str,
        id: String,
        field: &'static str,
        local: String,
        remote: String,
    },

    #[error("Failed to apply database changes; partial changes may already be applied: {0}")]
    ContainerReconciliation(String),

    #[error("Failed to set up '{id}': {message}")]
    Bootstrap { id: String, message: String },

    #[error("Failed to package '{id}': {message}")]
    Packaging { id: String, message: String },
}

/// Flags that shape a push run, threaded explicitly through every pusher.
#[derive(Debug, Clone)]
pub struct PushOptions {
    /// Approve every confirmation without prompting.
    pub force: bool,
    /// Push every local record of a kind instead of prompting.
    pub all: bool,
    pub verbose: bool,
    /// Create deployments without waiting for them to finish.
    pub async_deploy: bool,
    /// Upload code and create deployments for functions and sites.
    pub code: bool,
    /// Replace remote variables with the local `.env` file.
    pub with_variables: bool,
    /// Attempt Budget ceiling for each poll loop.
    pub attempts: u32,
    pub poll_interval: Duration,
    pub function_ids: Vec<String>,
    pub site_ids: Vec<String>,
    pub table_ids: Vec<String>,
    pub collection_ids: Vec<String>,
    pub bucket_ids: Vec<String>,
    pub team_ids: Vec<String>,
    pub topic_ids: Vec<String>,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            force: false,
            all: false,
            verbose: false,
            async_deploy: false,
            code: true,
            with_variables: false,
            attempts: DEFAULT_ATTEMPTS,
            poll_interval: Duration::from_secs(2),
            function_ids: Vec::new(),
            site_ids: Vec::new(),
            table_ids: Vec::new(),
            collection_ids: Vec::new(),
            bucket_ids: Vec::new(),
            team_ids: Vec::new(),
            topic_ids: Vec::new(),
        }
    }
}

impl PushOptions {
    fn ids_for(&self, kind: PushKind) -> &[String] {
        match kind {
            PushKind::Settings => &[],
            PushKind::Functions => &self.function_ids,
            PushKind::Sites => &self.site_ids,
            PushKind::Tables => &self.table_ids,
            PushKind::Collections => &self.collection_ids,
            PushKind::Buckets => &self.bucket_ids,
            PushKind::Teams => &self.team_ids,
            PushKind::Topics => &self.topic_ids,
        }
    }

    /// How the target set of `kind` is chosen.
    pub fn selection(&self, kind: PushKind) -> Selection {
        let ids = self.ids_for(kind);
        if !ids.is_empty() {
            Selection::Ids(ids.to_vec())
        } else if self.all {
            Selection::All
        } else {
            Selection::Interactive
        }
    }
}

/// Everything a pusher needs besides the config store.
pub struct PushContext<'a> {
    pub api: &'a dyn ResourceApi,
    pub prompter: &'a dyn Prompter,
    pub options: PushOptions,
    pub project_id: String,
    /// Console base URL, used for links to failed deployments.
    pub console_url: String,
}

impl PushContext<'_> {
    fn budget(&self) -> budget::AttemptBudget {
        budget::AttemptBudget::new(self.options.attempts)
    }
}

/// Resource kinds the orchestrator can push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PushKind {
    Settings,
    Functions,
    Sites,
    Tables,
    Collections,
    Buckets,
    Teams,
    Topics,
}

impl PushKind {
    /// "Push everything" order: containers and schemas before the resources
    /// that may reference them.
    pub const ALL_IN_ORDER: [PushKind; 7] = [
        PushKind::Settings,
        PushKind::Tables,
        PushKind::Buckets,
        PushKind::Teams,
        PushKind::Topics,
        PushKind::Functions,
        PushKind::Sites,
    ];

    pub const PROMPT_ORDER: [PushKind; 8] = [
        PushKind::Settings,
        PushKind::Functions,
        PushKind::Sites,
        PushKind::Tables,
        PushKind::Buckets,
        PushKind::Teams,
        PushKind::Topics,
        PushKind::Collections,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Settings => "settings",
            Self::Functions => "function",
            Self::Sites => "site",
            Self::Tables => "table",
            Self::Collections => "collection",
            Self::Buckets => "bucket",
            Self::Teams => "team",
            Self::Topics => "topic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::PROMPT_ORDER
            .into_iter()
            .find(|k| k.name() == s || format!("{}s", k.name()) == s)
    }

    /// Superseded by tables; never part of "push everything".
    pub fn is_deprecated(&self) -> bool {
        matches!(self, Self::Collections)
    }

    fn prompt_label(&self) -> String {
        if self.is_deprecated() {
            format!("{} (deprecated, use table)", self.name())
        } else {
            self.name().to_string()
        }
    }
}

/// What `push` was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushTarget {
    All,
    Kind(PushKind),
    Prompt,
}

/// How a pusher picks its resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Ids(Vec<String>),
    All,
    Interactive,
}

/// Narrow `items` down to the selected ones.
pub fn resolve_selection<T>(
    prompter: &dyn Prompter,
    selection: &Selection,
    noun: &str,
    items: Vec<T>,
    id_of: impl Fn(&T) -> &str,
    label_of: impl Fn(&T) -> String,
) -> Result<Vec<T>> {
    match selection {
        Selection::All => Ok(items),
        Selection::Ids(ids) => {
            for id in ids {
                if !items.iter().any(|item| id_of(item) == id) {
                    bail!("{noun} '{id}' not found in the project config");
                }
            }
            Ok(items
                .into_iter()
                .filter(|item| ids.iter().any(|id| id == id_of(item)))
                .collect())
        }
        Selection::Interactive => {
            if items.is_empty() {
                return Ok(items);
            }
            let labels: Vec<String> = items.iter().map(&label_of).collect();
            let picked = prompter.multi_select(&format!("Which {noun}s would you like to push?"), &labels)?;
            Ok(items
                .into_iter()
                .enumerate()
                .filter(|(i, _)| picked.contains(i))
                .map(|(_, item)| item)
                .collect())
        }
    }
}

/// Print the "nothing to push" hint for `noun`.
pub fn print_empty_hint(noun: &str) {
    println!(
        "{} No {noun}s found in the current directory. Use {} to synchronize existing ones, or {} to create a new one.",
        "!".yellow().bold(),
        format!("appwrite pull {noun}s").cyan(),
        format!("appwrite init {noun}").cyan()
    );
}

/// A resource that could not be pushed.
#[derive(Debug)]
pub struct ResourceFailure {
    pub id: String,
    pub error: anyhow::Error,
}

/// Why a deployment did not become ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentFailure {
    /// The remote reported `failed`.
    Remote,
    /// We stopped checking after this many polls.
    TimedOut { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDeployment {
    pub id: String,
    pub name: String,
    pub deployment_id: String,
    pub reason: DeploymentFailure,
    pub console_url: String,
}

/// Outcome of one pusher run.
#[derive(Debug, Default)]
pub struct PushSummary {
    pub label: &'static str,
    pub pushed: usize,
    pub deployed: usize,
    pub deployable: bool,
    pub failures: Vec<ResourceFailure>,
    pub failed_deployments: Vec<FailedDeployment>,
}

impl PushSummary {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            ..Self::default()
        }
    }

    pub fn message(&self) -> String {
        format!("Successfully pushed {} {}.", self.pushed, self.label)
    }

    /// Print the final status block for this kind.
    pub fn report(&self, verbose: bool) {
        println!();
        for failure in &self.failures {
            println!(
                "{} {} '{}': {}",
                "x".red().bold(),
                self.label,
                failure.id,
                failure.error
            );
            if verbose {
                println!("{:?}", failure.error);
            }
        }
        if !self.failed_deployments.is_empty() {
            println!(
                "{} {} deployment(s) did not become ready:",
                "!".yellow().bold(),
                self.failed_deployments.len()
            );
            for failed in &self.failed_deployments {
                let reason = match failed.reason {
                    DeploymentFailure::Remote => "build failed".to_string(),
                    DeploymentFailure::TimedOut { attempts } => {
                        format!("stopped checking after {attempts} attempts; it may still finish")
                    }
                };
                println!(
                    "  {} {} ({}): {}",
                    "-".dimmed(),
                    failed.name.bold(),
                    reason,
                    failed.console_url.cyan()
                );
            }
        }
        println!("{} {}", "OK".green().bold(), self.message());
        if self.deployable && self.deployed > 0 {
            println!(
                "{} Successfully deployed {} {}.",
                "OK".green().bold(),
                self.deployed,
                self.label
            );
        }
    }
}

/// Run one pusher.
async fn run_kind(ctx: &PushContext<'_>, store: &mut ConfigStore, kind: PushKind) -> Result<PushSummary> {
    info!(kind = kind.name(), "pushing");
    let summary = match kind {
        PushKind::Settings => settings::push_settings(ctx, store).await?,
        PushKind::Functions => functions::push_functions(ctx, store).await?,
        PushKind::Sites => sites::push_sites(ctx, store).await?,
        PushKind::Tables => tables::push_tables(ctx, store).await?,
        PushKind::Collections => tables::push_collections(ctx, store).await?,
        PushKind::Buckets => standard::push_buckets(ctx, store).await?,
        PushKind::Teams => standard::push_teams(ctx, store).await?,
        PushKind::Topics => standard::push_topics(ctx, store).await?,
    };
    summary.report(ctx.options.verbose);
    Ok(summary)
}

/// Push Orchestrator.
///
/// `All` runs every non-deprecated pusher in sequence; `Prompt` asks for one kind.
pub async fn push_resources(
    ctx: &PushContext<'_>,
    store: &mut ConfigStore,
    target: PushTarget,
) -> Result<Vec<PushSummary>> {
    match target {
        PushTarget::All => {
            let batch = PushContext {
                api: ctx.api,
                prompter: ctx.prompter,
                options: PushOptions {
                    all: true,
                    ..ctx.options.clone()
                },
                project_id: ctx.project_id.clone(),
                console_url: ctx.console_url.clone(),
            };
            let mut summaries = Vec::new();
            for kind in PushKind::ALL_IN_ORDER {
                summaries.push(run_kind(&batch, store, kind).await?);
            }
            Ok(summaries)
        }
        PushTarget::Kind(kind) => Ok(vec![push_single(ctx, store, kind).await?]),
        PushTarget::Prompt => {
            let labels: Vec<String> = PushKind::PROMPT_ORDER
                .iter()
                .map(PushKind::prompt_label)
                .collect();
            let index = ctx
                .prompter
                .select("What would you like to push?", &labels)?;
            let Some(kind) = PushKind::PROMPT_ORDER.get(index).copied() else {
                bail!("Invalid selection");
            };
            Ok(vec![push_single(ctx, store, kind).await?])
        }
    }
}

async fn push_single(
    ctx: &PushContext<'_>,
    store: &mut ConfigStore,
    kind: PushKind,
) -> Result<PushSummary> {
    if kind.is_deprecated() {
        println!(
            "{} '{}' is deprecated. Use {} instead.",
            "!".yellow().bold(),
            kind.name(),
            "appwrite push table".cyan()
        );
    }
    run_kind(ctx, store, kind).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_all_excludes_deprecated_kind() {
        assert!(!PushKind::ALL_IN_ORDER.contains(&PushKind::Collections));
        assert!(PushKind::PROMPT_ORDER.contains(&PushKind::Collections));
    }

    #[test]
    fn test_tables_run_before_deployables() {
        let pos = |k| PushKind::ALL_IN_ORDER.iter().position(|x| *x == k).unwrap();
        assert!(pos(PushKind::Tables) < pos(PushKind::Functions));
        assert!(pos(PushKind::Settings) < pos(PushKind::Tables));
    }

    #[test]
    fn test_parse_kind_names() {
        assert_eq!(PushKind::parse("function"), Some(PushKind::Functions));
        assert_eq!(PushKind::parse("tables"), Some(PushKind::Tables));
        assert_eq!(PushKind::parse("settings"), Some(PushKind::Settings));
        assert_eq!(PushKind::parse("all"), None);
    }

    #[test]
    fn test_selection_precedence() {
        let mut opts = PushOptions {
            all: true,
            ..PushOptions::default()
        };
        assert_eq!(opts.selection(PushKind::Buckets), Selection::All);
        opts.bucket_ids = vec!["images".into()];
        assert_eq!(
            opts.selection(PushKind::Buckets),
            Selection::Ids(vec!["images".into()])
        );
        opts.all = false;
        assert_eq!(opts.selection(PushKind::Teams), Selection::Interactive);
    }

    #[test]
    fn test_summary_message() {
        let summary = PushSummary::new("buckets");
        assert_eq!(summary.message(), "Successfully pushed 0 buckets.");
    }
}
