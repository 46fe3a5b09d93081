//! Interactive questions asked during a push.
//!
//! The engine only talks to [`Prompter`]; the terminal implementation uses
//! `dialoguer`, tests script the answers.

use anyhow::{Context, Result};

pub trait Prompter: Send + Sync {
    /// Free-text answer.
    fn text(&self, prompt: &str) -> Result<String>;

    /// Free-text answer with a suggested default.
    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String>;

    /// Pick exactly one item; returns its index.
    fn select(&self, prompt: &str, items: &[String]) -> Result<usize>;

    /// Pick any number of items; returns their indexes.
    fn multi_select(&self, prompt: &str, items: &[String]) -> Result<Vec<usize>>;
}

/// Prompts on the controlling terminal.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn text(&self, prompt: &str) -> Result<String> {
        dialoguer::Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .context("Failed to read answer")
    }

    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String> {
        let mut input = dialoguer::Input::<String>::new().with_prompt(prompt);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        input.interact_text().context("Failed to read answer")
    }

    fn select(&self, prompt: &str, items: &[String]) -> Result<usize> {
        dialoguer::Select::new()
            .with_prompt(prompt)
            .items(items)
            .default(0)
            .interact()
            .context("Failed to read selection")
    }

    fn multi_select(&self, prompt: &str, items: &[String]) -> Result<Vec<usize>> {
        dialoguer::MultiSelect::new()
            .with_prompt(prompt)
            .items(items)
            .interact()
            .context("Failed to read selection")
    }
}
