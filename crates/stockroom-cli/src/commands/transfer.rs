//! Export and import of full store dumps

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use stockroom_core::store::EXPORT_VERSION;
use stockroom_core::{Store, StoreDump};

use super::confirm;
use crate::output::Output;

/// Write a JSON dump of both collections to `path`, or stdout
pub fn export(store: &Store, path: Option<PathBuf>, output: &Output) -> Result<()> {
    let dump = store.export();
    let json = serde_json::to_string_pretty(&dump).context("Failed to encode dump")?;

    match path {
        Some(path) => {
            fs::write(&path, json).with_context(|| format!("Failed to write {:?}", path))?;
            output.success(&format!(
                "Exported {} business(es) and {} article(s) to {}",
                dump.businesses.len(),
                dump.articles.len(),
                path.display()
            ));
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Replace the store contents with a dump read from `path`
pub fn import(store: &Store, path: PathBuf, yes: bool, output: &Output) -> Result<bool> {
    let content =
        fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
    let dump: StoreDump = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse dump {:?}", path))?;

    if dump.version != EXPORT_VERSION {
        bail!(
            "Unsupported dump version {} (expected {})",
            dump.version,
            EXPORT_VERSION
        );
    }

    let existing = store.businesses().len() + store.articles().len();
    if existing > 0 && !yes && output.should_prompt() {
        println!(
            "Importing replaces {} local document(s), including unsynced changes.",
            existing
        );
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(false);
        }
    }

    let counts = (dump.businesses.len(), dump.articles.len());
    store.import(dump).context("Failed to import dump")?;

    output.success(&format!(
        "Imported {} business(es) and {} article(s)",
        counts.0, counts.1
    ));
    Ok(true)
}
