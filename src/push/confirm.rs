//! Operator approval before any mutating call.

use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Color, Table};

use super::changes::{render_changes, ChangeRecord};
use crate::prompt::Prompter;

pub const APPROVE: &str = "YES";
pub const REJECT: &str = "NO";

/// Answer the second deletion warning must match.
pub const DELETE_TOKEN: &str = "DELETE";

/// Ask until the operator types exactly `YES` or `NO`.
pub fn ask_approval(prompter: &dyn Prompter, question: &str) -> Result<bool> {
    let prompt = format!("{question} Type \"{APPROVE}\" to confirm or \"{REJECT}\" to cancel");
    loop {
        let answer = prompter.text(&prompt)?;
        match answer.trim() {
            APPROVE => return Ok(true),
            REJECT => return Ok(false),
            _ => println!(
                "{} Please answer \"{}\" or \"{}\".",
                "!".yellow().bold(),
                APPROVE,
                REJECT
            ),
        }
    }
}

/// Approve a change list. Empty lists and `force` approve without prompting.
pub fn confirm_changes(
    prompter: &dyn Prompter,
    force: bool,
    changes: &[ChangeRecord],
) -> Result<bool> {
    if changes.is_empty() || force {
        return Ok(true);
    }
    println!();
    println!("{}", render_changes(changes));
    println!();
    ask_approval(
        prompter,
        "Remote and local resources differ. Would you like to apply these changes?",
    )
}

/// List remote resources about to be deleted and ask once for approval.
pub fn confirm_listed(
    prompter: &dyn Prompter,
    force: bool,
    what: &str,
    items: &[String],
) -> Result<bool> {
    if items.is_empty() || force {
        return Ok(true);
    }
    println!();
    println!("{}", deletion_table(what, items));
    ask_approval(prompter, &format!("Delete these {what}?"))
}

/// Approve deleting remote resources whose removal cascades. Lists them,
/// then asks twice: once for approval and once for the typed `DELETE` token.
pub fn confirm_deletion(
    prompter: &dyn Prompter,
    force: bool,
    what: &str,
    consequence: &str,
    items: &[String],
) -> Result<bool> {
    if items.is_empty() || force {
        return Ok(true);
    }

    println!();
    println!("{}", deletion_table(what, items));
    println!(
        "{} {} {} will be permanently deleted. {}",
        "!".red().bold(),
        items.len(),
        what,
        consequence
    );

    if !ask_approval(prompter, &format!("Delete these {what}?"))? {
        return Ok(false);
    }
    let typed = prompter.text(&format!(
        "This cannot be undone. Type \"{DELETE_TOKEN}\" to permanently delete {} {what}",
        items.len()
    ))?;
    Ok(typed.trim() == DELETE_TOKEN)
}

fn deletion_table(what: &str, items: &[String]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![Cell::new(format!("deleting {what}")).fg(Color::Red)]);
    for item in items {
        table.add_row(vec![Cell::new(item)]);
    }
    table
}
