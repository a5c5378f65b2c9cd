//! Status command handler

use anyhow::Result;

use stockroom_core::{CollectionBacklog, Store};

use crate::output::{Output, OutputFormat};

/// Show status information
pub fn show(store: &Store, output: &Output) -> Result<()> {
    let backlog = store.backlog();
    let config = store.config();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "sync_enabled": config.sync_enabled,
                    "remote_url": config.remote_url,
                    "data_dir": config.data_dir,
                    "backlog": backlog,
                    "up_to_date": backlog.is_clear()
                })
            );
        }
        OutputFormat::Quiet => {
            println!(
                "{}",
                backlog.businesses.outstanding() + backlog.articles.outstanding()
            );
        }
        OutputFormat::Human => {
            println!("Stockroom Status");
            println!("================");
            println!();
            println!("Sync:");
            println!(
                "  Status: {}",
                if config.sync_enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            if let Some(ref url) = config.remote_url {
                println!("  Remote: {}", url);
            }
            println!();
            println!("Storage:");
            println!("  Location: {}", config.sqlite_path().display());
            println!();
            print_backlog("Businesses", &backlog.businesses);
            print_backlog("Articles", &backlog.articles);
            println!();
            if backlog.is_clear() {
                println!("Everything is replicated.");
            } else {
                println!("Run `stockroom sync` to replicate pending changes.");
            }
        }
    }

    Ok(())
}

fn print_backlog(label: &str, backlog: &CollectionBacklog) {
    println!("{}: {}", label, backlog.total);
    println!("  Pending creates: {}", backlog.pending_creates);
    println!("  Pending updates: {}", backlog.pending_updates);
    println!("  Pending deletes: {}", backlog.tombstones);
}
