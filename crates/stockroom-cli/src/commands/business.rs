//! Business command handlers

use anyhow::{Context, Result};

use stockroom_core::Store;

use super::{confirm, resolve_id};
use crate::output::{short_id, Output};

/// Create a new business
pub fn add(store: &Store, name: String, output: &Output) -> Result<()> {
    let business = store
        .add_business(name.trim())
        .context("Failed to create business")?;

    output.success(&format!("Created business: {}", business.id));
    output.print_business(&business, 0);
    Ok(())
}

/// List businesses with their article counts
pub fn list(store: &Store, output: &Output) -> Result<()> {
    let businesses: Vec<_> = store
        .visible_businesses()
        .into_iter()
        .map(|business| {
            let articles = store.articles_for_business(&business.id).len();
            (business, articles)
        })
        .collect();

    output.print_businesses(&businesses);
    Ok(())
}

/// Show a single business
pub fn show(store: &Store, id: String, output: &Output) -> Result<()> {
    let id = resolve_id(store.businesses(), &id, "business")?;
    let business = store
        .businesses()
        .find_by_id(&id)
        .ok_or_else(|| anyhow::anyhow!("Business not found: {}", id))?;

    output.print_business(&business, store.articles_for_business(&id).len());
    Ok(())
}

/// Rename a business
pub fn rename(store: &Store, id: String, name: String, output: &Output) -> Result<()> {
    let id = resolve_id(store.businesses(), &id, "business")?;
    let business = store
        .rename_business(&id, name.trim())
        .context("Failed to rename business")?;

    output.success(&format!("Renamed business: {}", business.name));
    Ok(())
}

/// Delete a business and its articles
pub fn delete(store: &Store, id: String, yes: bool, output: &Output) -> Result<bool> {
    let id = resolve_id(store.businesses(), &id, "business")?;
    let articles = store.articles_for_business(&id).len();

    if !yes && output.should_prompt() {
        let name = store
            .businesses()
            .find_by_id(&id)
            .map(|b| b.name)
            .unwrap_or_default();
        println!("Delete business: {} - {}", short_id(&id), name);
        if articles > 0 {
            println!("This also deletes {} article(s).", articles);
        }
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(false);
        }
    }

    let removed = store
        .delete_business(&id)
        .context("Failed to delete business")?;

    output.success(&format!(
        "Deleted business {} and {} article(s)",
        short_id(&id),
        removed
    ));
    Ok(true)
}
