//! Buckets, teams and messaging topics: plain upserts with no sub-resources.

use anyhow::{Context, Result};
use colored::Colorize;
use futures::future::join_all;

use super::changes::{detect_changes, diff_fields};
use super::confirm::confirm_changes;
use super::{print_empty_hint, resolve_selection, PushContext, PushKind, PushSummary, ResourceFailure};
use crate::config::ConfigStore;
use crate::models::Tracked;

pub async fn push_buckets(ctx: &PushContext<'_>, store: &mut ConfigStore) -> Result<PushSummary> {
    push_records(ctx, PushKind::Buckets, store.get_buckets()?).await
}

pub async fn push_teams(ctx: &PushContext<'_>, store: &mut ConfigStore) -> Result<PushSummary> {
    push_records(ctx, PushKind::Teams, store.get_teams()?).await
}

pub async fn push_topics(ctx: &PushContext<'_>, store: &mut ConfigStore) -> Result<PushSummary> {
    push_records(ctx, PushKind::Topics, store.get_messaging_topics()?).await
}

async fn push_records<R: Tracked>(
    ctx: &PushContext<'_>,
    kind: PushKind,
    records: Vec<R>,
) -> Result<PushSummary> {
    let noun = kind.name();
    let mut summary = PushSummary::new(R::KIND.label());

    let selected = resolve_selection(
        ctx.prompter,
        &ctx.options.selection(kind),
        noun,
        records,
        |r| r.id(),
        |r| r.label(),
    )?;
    if selected.is_empty() {
        print_empty_hint(noun);
        return Ok(summary);
    }

    let changes = detect_changes(ctx.api, &selected, &[]).await?;
    if !confirm_changes(ctx.prompter, ctx.options.force, &changes)? {
        return Ok(summary);
    }

    let results = join_all(
        selected
            .iter()
            .map(|record| async move { (record, upsert(ctx, noun, record).await) }),
    )
    .await;
    for (record, result) in results {
        match result {
            Ok(()) => summary.pushed += 1,
            Err(error) => summary.failures.push(ResourceFailure {
                id: record.id().to_string(),
                error,
            }),
        }
    }
    Ok(summary)
}

async fn upsert<R: Tracked>(ctx: &PushContext<'_>, noun: &str, record: &R) -> Result<()> {
    let target = record.resource_ref();
    match ctx.api.get(R::KIND, &target).await {
        Ok(remote) => {
            if diff_fields(record.id(), &record.fields(), &remote, &[]).is_empty() {
                return Ok(());
            }
            ctx.api
                .update(R::KIND, &target, record.body())
                .await
                .with_context(|| format!("Failed to update {noun}"))?;
            println!("{} Updated {noun} {}", "~".yellow().bold(), record.id().bold());
        }
        Err(e) if e.is_not_found() => {
            ctx.api
                .create(R::KIND, &target, record.body())
                .await
                .with_context(|| format!("Failed to create {noun}"))?;
            println!("{} Created {noun} {}", "+".green().bold(), record.id().bold());
        }
        Err(e) => return Err(anyhow::Error::new(e).context(format!("Failed to fetch remote {noun}"))),
    }
    Ok(())
}
