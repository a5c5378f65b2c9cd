//! Command handlers

pub mod article;
pub mod business;
pub mod config;
pub mod status;
pub mod sync;
pub mod transfer;
pub mod watch;

use std::io::{self, IsTerminal, Write};

use anyhow::{bail, Result};

use stockroom_core::{Collection, Document};

/// Resolve a full id or a unique prefix to a live document id
fn resolve_id<T: Document>(collection: &Collection<T>, id: &str, kind: &str) -> Result<String> {
    if let Some(doc) = collection.find_by_id(id) {
        if !doc.is_tombstoned() {
            return Ok(doc.id().to_string());
        }
    }

    let matches: Vec<String> = collection
        .find_where(|doc| !doc.is_tombstoned() && doc.id().starts_with(id))
        .map(|doc| doc.id().to_string())
        .collect();

    match matches.as_slice() {
        [] => bail!("No {} found matching: {}", kind, id),
        [only] => Ok(only.clone()),
        _ => {
            eprintln!("Multiple {}s match '{}':", kind, id);
            for candidate in &matches {
                eprintln!("  {}", candidate);
            }
            bail!("Ambiguous ID. Please provide more characters.");
        }
    }
}

/// Ask for confirmation; always `false` when stdin is not a terminal
fn confirm(prompt: &str) -> Result<bool> {
    if !io::stdin().is_terminal() {
        return Ok(false);
    }

    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}
