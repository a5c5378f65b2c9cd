//! Article command handlers

use anyhow::{bail, Context, Result};

use stockroom_core::{ArticlePatch, NewArticle, Store};

use super::{confirm, resolve_id};
use crate::output::{short_id, Output};

/// Fields given on the command line for a new article
pub struct ArticleArgs {
    pub business: String,
    pub name: String,
    pub quantity: u64,
    pub price: f64,
}

/// Create an article owned by a business
pub fn add(store: &Store, args: ArticleArgs, output: &Output) -> Result<()> {
    let business_id = resolve_id(store.businesses(), &args.business, "business")?;

    let article = store
        .add_article(NewArticle {
            name: args.name.trim().to_string(),
            quantity: args.quantity,
            unit_price: args.price,
            business_id,
        })
        .context("Failed to create article")?;

    output.success(&format!("Created article: {}", article.id));
    output.print_article(&article);
    Ok(())
}

/// List articles, optionally for one business
pub fn list(store: &Store, business: Option<String>, output: &Output) -> Result<()> {
    let articles = match business {
        Some(business) => {
            let business_id = resolve_id(store.businesses(), &business, "business")?;
            store.articles_for_business(&business_id)
        }
        None => store.visible_articles(),
    };

    output.print_articles(&articles);
    Ok(())
}

/// Apply a partial update to an article
pub fn update(store: &Store, id: String, mut patch: ArticlePatch, output: &Output) -> Result<()> {
    if patch.name.is_none()
        && patch.quantity.is_none()
        && patch.unit_price.is_none()
        && patch.business_id.is_none()
    {
        bail!("Nothing to update. Pass at least one of --name, --qty, --price, --business.");
    }

    let id = resolve_id(store.articles(), &id, "article")?;
    if let Some(business) = patch.business_id.take() {
        patch.business_id = Some(resolve_id(store.businesses(), &business, "business")?);
    }
    if let Some(name) = patch.name.take() {
        patch.name = Some(name.trim().to_string());
    }

    let article = store
        .update_article(&id, patch)
        .context("Failed to update article")?;

    output.success(&format!("Updated article: {}", short_id(&article.id)));
    output.print_article(&article);
    Ok(())
}

/// Delete an article
pub fn delete(store: &Store, id: String, yes: bool, output: &Output) -> Result<bool> {
    let id = resolve_id(store.articles(), &id, "article")?;

    if !yes && output.should_prompt() {
        let name = store
            .articles()
            .find_by_id(&id)
            .map(|a| a.name)
            .unwrap_or_default();
        println!("Delete article: {} - {}", short_id(&id), name);
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(false);
        }
    }

    store
        .delete_article(&id)
        .context("Failed to delete article")?;

    output.success(&format!("Deleted article: {}", short_id(&id)));
    Ok(true)
}
