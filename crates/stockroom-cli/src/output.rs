//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use stockroom_core::{Article, Business, Document, PassOutcome};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
#[derive(Debug, Clone, Copy)]
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print a single business
    pub fn print_business(&self, business: &Business, articles: usize) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", business.id);
                println!("Name:     {}", business.name);
                println!("Articles: {}", articles);
                println!("Sync:     {}", sync_label(business));
                println!("Created:  {}", business.created_at.format("%Y-%m-%d %H:%M"));
                println!("Updated:  {}", business.updated_at.format("%Y-%m-%d %H:%M"));
            }
            OutputFormat::Json => print_json(business),
            OutputFormat::Quiet => println!("{}", business.id),
        }
    }

    /// Print a list of businesses with their article counts
    pub fn print_businesses(&self, businesses: &[(Business, usize)]) {
        match self.format {
            OutputFormat::Human => {
                if businesses.is_empty() {
                    println!("No businesses found.");
                    return;
                }
                for (business, articles) in businesses {
                    println!(
                        "{} | {} | {} article(s) | {}",
                        short_id(&business.id),
                        truncate(&business.name, 40),
                        articles,
                        sync_label(business)
                    );
                }
                println!("\n{} business(es)", businesses.len());
            }
            OutputFormat::Json => {
                let list: Vec<&Business> = businesses.iter().map(|(b, _)| b).collect();
                print_json(&list);
            }
            OutputFormat::Quiet => {
                for (business, _) in businesses {
                    println!("{}", business.id);
                }
            }
        }
    }

    /// Print a single article
    pub fn print_article(&self, article: &Article) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", article.id);
                println!("Name:     {}", article.name);
                println!("Quantity: {}", article.quantity);
                println!("Price:    {:.2}", article.unit_price);
                println!("Value:    {:.2}", article.stock_value());
                println!("Business: {}", article.business_id);
                println!("Sync:     {}", sync_label(article));
            }
            OutputFormat::Json => print_json(article),
            OutputFormat::Quiet => println!("{}", article.id),
        }
    }

    /// Print a list of articles
    pub fn print_articles(&self, articles: &[Article]) {
        match self.format {
            OutputFormat::Human => {
                if articles.is_empty() {
                    println!("No articles found.");
                    return;
                }
                for article in articles {
                    println!(
                        "{} | {} | {} x {:.2} | {} | {}",
                        short_id(&article.id),
                        truncate(&article.name, 30),
                        article.quantity,
                        article.unit_price,
                        short_id(&article.business_id),
                        sync_label(article)
                    );
                }
                println!("\n{} article(s)", articles.len());
            }
            OutputFormat::Json => print_json(&articles),
            OutputFormat::Quiet => {
                for article in articles {
                    println!("{}", article.id);
                }
            }
        }
    }

    /// Print the outcome of a replication pass
    pub fn print_outcome(&self, outcome: &PassOutcome) {
        match self.format {
            OutputFormat::Human => match outcome {
                PassOutcome::Completed(stats) => {
                    println!(
                        "✓ Sync complete - pulled {}, pushed {}",
                        stats.pulled(),
                        stats.pushed()
                    );
                    if stats.conflicts > 0 {
                        println!("  Conflicts resolved: {}", stats.conflicts);
                    }
                    if stats.deferred > 0 {
                        println!("  Left for next sync: {}", stats.deferred);
                    }
                }
                other => println!("Sync skipped: {}", other),
            },
            OutputFormat::Json => print_json(outcome),
            OutputFormat::Quiet => {}
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Pretty-print any serializable value
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode output: {}", e),
    }
}

/// Replication status of a document as shown to the user
pub fn sync_label<T: Document>(doc: &T) -> &'static str {
    if doc.is_tombstoned() {
        "deleting"
    } else if doc.is_pending() {
        "pending"
    } else if doc.is_modified() {
        "modified"
    } else {
        "synced"
    }
}

/// First eight characters of an id
pub fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
