use anyhow::{bail, Context, Result};
use colored::Colorize;

use crate::api::http::HttpResourceApi;
use crate::config::ConfigStore;
use crate::context;
use crate::prompt::TerminalPrompter;
use crate::push::{push_resources, PushContext, PushKind, PushOptions, PushSummary, PushTarget};

/// Interpret the positional `push` argument.
pub fn parse_target(target: Option<&str>) -> Result<PushTarget> {
    match target {
        None => Ok(PushTarget::Prompt),
        Some("all") => Ok(PushTarget::All),
        Some(name) => match PushKind::parse(name) {
            Some(kind) => Ok(PushTarget::Kind(kind)),
            None => bail!(
                "Unknown push target '{name}'. Expected one of: all, settings, function, site, table, collection, bucket, team, topic"
            ),
        },
    }
}

/// Resources that failed across all summaries.
pub fn failure_count(summaries: &[PushSummary]) -> usize {
    summaries.iter().map(|s| s.failures.len()).sum()
}

pub async fn run(target: Option<String>, options: PushOptions) -> Result<()> {
    let target = parse_target(target.as_deref())?;

    let config_path = context::find_project_config()?;
    let mut store = ConfigStore::load(&config_path)?;
    let project = store.get_project()?;
    let root = store.root();
    let client = context::load_client_config(Some(&root))?;

    println!(
        "{} Pushing to project {} ({})",
        ">".cyan().bold(),
        project.id.bold(),
        client.endpoint.dimmed()
    );
    println!();

    let api = HttpResourceApi::new(&client, &project.id).context("Failed to create API client")?;
    let prompter = TerminalPrompter;
    let ctx = PushContext {
        api: &api,
        prompter: &prompter,
        options,
        project_id: project.id.clone(),
        console_url: client.console_url(),
    };

    let summaries = push_resources(&ctx, &mut store, target).await?;
    let failed = failure_count(&summaries);
    if failed > 0 {
        bail!("{failed} resource(s) failed to push");
    }
    Ok(())
}
