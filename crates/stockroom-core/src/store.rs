//! Unified storage interface
//!
//! The `Store` owns both replicated collections and enforces the rules
//! that span them:
//! - an article must reference an existing, non-tombstoned business
//! - deleting a business tombstones every article it owns
//!
//! Operations that read one collection to decide a write to the other run
//! under a store-wide lock, so an article cannot slip in under a business
//! that is being deleted.
//!
//! Cloning a `Store` is cheap; clones share the same collections, so the
//! replication engine and the UI see the same data.
//!
//! ## Usage
//!
//! ```ignore
//! let store = Store::open()?;
//!
//! let acme = store.add_business("Acme")?;
//! store.add_article(NewArticle { business_id: acme.id.clone(), .. })?;
//!
//! let visible = store.visible_businesses();
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;
use crate::models::{
    Article, ArticlePatch, Business, BusinessPatch, Document, NewArticle,
};
use crate::storage::{restore_both, Collection, SqlitePersistence, StoreError, StoreResult};

/// Version of the export format
pub const EXPORT_VERSION: u32 = 1;

/// Full dump of both collections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDump {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub businesses: Vec<Business>,
    pub articles: Vec<Article>,
}

/// Outstanding replication work for one collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionBacklog {
    pub total: usize,
    /// Never confirmed by the remote
    pub pending_creates: usize,
    /// Synced, then edited locally
    pub pending_updates: usize,
    /// Waiting for the remote delete
    pub tombstones: usize,
}

impl CollectionBacklog {
    fn of<T: Document>(docs: &[T]) -> Self {
        let mut backlog = Self {
            total: docs.len(),
            ..Self::default()
        };
        for doc in docs {
            if doc.is_tombstoned() {
                backlog.tombstones += 1;
            } else if doc.is_pending() {
                backlog.pending_creates += 1;
            } else if doc.is_modified() {
                backlog.pending_updates += 1;
            }
        }
        backlog
    }

    /// Documents the next pass has work for
    pub fn outstanding(&self) -> usize {
        self.pending_creates + self.pending_updates + self.tombstones
    }
}

/// Outstanding replication work across collections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Backlog {
    pub businesses: CollectionBacklog,
    pub articles: CollectionBacklog,
}

impl Backlog {
    pub fn is_clear(&self) -> bool {
        self.businesses.outstanding() + self.articles.outstanding() == 0
    }
}

/// Unified storage interface for Stockroom
#[derive(Clone)]
pub struct Store {
    businesses: Collection<Business>,
    articles: Collection<Article>,
    persistence: Arc<SqlitePersistence>,
    config: Config,
    links: Arc<Mutex<()>>,
}

impl Store {
    /// Open the store using the default configuration
    pub fn open() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::open_with_config(config)
    }

    /// Open the store with a specific configuration
    pub fn open_with_config(config: Config) -> Result<Self> {
        let path = config.sqlite_path();
        let persistence = SqlitePersistence::open(&path)
            .with_context(|| format!("Failed to open local store at {:?}", path))?;
        Self::from_persistence(Arc::new(persistence), config)
    }

    /// Open a store that lives only in memory
    pub fn open_in_memory() -> Result<Self> {
        let persistence =
            SqlitePersistence::open_in_memory().context("Failed to open in-memory store")?;
        Self::from_persistence(Arc::new(persistence), Config::default())
    }

    fn from_persistence(persistence: Arc<SqlitePersistence>, config: Config) -> Result<Self> {
        let businesses = Collection::open(Arc::clone(&persistence))
            .context("Failed to load businesses")?;
        let articles =
            Collection::open(Arc::clone(&persistence)).context("Failed to load articles")?;

        info!(
            businesses = businesses.len(),
            articles = articles.len(),
            "Opened store"
        );

        Ok(Self {
            businesses,
            articles,
            persistence,
            config,
            links: Arc::new(Mutex::new(())),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether the store is backed by a file
    pub fn is_durable(&self) -> bool {
        self.persistence.path().is_some()
    }

    pub fn businesses(&self) -> &Collection<Business> {
        &self.businesses
    }

    pub fn articles(&self) -> &Collection<Article> {
        &self.articles
    }

    // ==================== Business Operations ====================

    /// Create a pending business
    pub fn add_business(&self, name: &str) -> StoreResult<Business> {
        self.businesses.insert(Business::new(name))
    }

    pub fn rename_business(&self, id: &str, name: &str) -> StoreResult<Business> {
        self.businesses.update(
            id,
            BusinessPatch {
                name: Some(name.to_string()),
            },
        )
    }

    /// Tombstone a business and every article it owns
    ///
    /// Returns the number of articles tombstoned.
    pub fn delete_business(&self, id: &str) -> StoreResult<usize> {
        let _links = self.lock_links();
        self.businesses.tombstone(id)?;

        let owned: Vec<Article> = self
            .articles
            .find_where(|a| a.business_id == id && !a.is_tombstoned())
            .collect();
        for article in &owned {
            self.articles.tombstone(&article.id)?;
        }

        debug!(id, articles = owned.len(), "Cascaded business delete");
        Ok(owned.len())
    }

    /// Businesses not slated for deletion
    pub fn visible_businesses(&self) -> Vec<Business> {
        self.businesses.find_where(|b| !b.is_tombstoned()).collect()
    }

    // ==================== Article Operations ====================

    /// Create a pending article owned by an existing business
    pub fn add_article(&self, new: NewArticle) -> StoreResult<Article> {
        let _links = self.lock_links();
        self.require_business(&new.business_id)?;
        self.articles.insert(Article::new(new))
    }

    /// Merge a partial update; moving an article requires a live business
    pub fn update_article(&self, id: &str, patch: ArticlePatch) -> StoreResult<Article> {
        let _links = patch.business_id.is_some().then(|| self.lock_links());
        if let Some(business_id) = &patch.business_id {
            self.require_business(business_id)?;
        }
        self.articles.update(id, patch)
    }

    pub fn delete_article(&self, id: &str) -> StoreResult<Article> {
        self.articles.tombstone(id)
    }

    /// Articles of a business not slated for deletion
    pub fn articles_for_business(&self, business_id: &str) -> Vec<Article> {
        self.articles
            .find_where(|a| a.business_id == business_id && !a.is_tombstoned())
            .collect()
    }

    pub fn visible_articles(&self) -> Vec<Article> {
        self.articles.find_where(|a| !a.is_tombstoned()).collect()
    }

    /// Tombstone live articles whose business is tombstoned
    ///
    /// A pull can bring in an article created remotely under a business
    /// that was deleted here. The replication engine runs this before
    /// pushing, so such articles are deleted in the same pass as their
    /// business. Returns the number of articles tombstoned.
    pub fn cascade_deletes(&self) -> StoreResult<usize> {
        let _links = self.lock_links();
        let doomed: HashSet<String> = self
            .businesses
            .find_where(|b| b.is_tombstoned())
            .map(|b| b.id)
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        let orphans: Vec<Article> = self
            .articles
            .find_where(|a| !a.is_tombstoned() && doomed.contains(&a.business_id))
            .collect();
        for article in &orphans {
            self.articles.tombstone(&article.id)?;
        }

        if !orphans.is_empty() {
            info!(articles = orphans.len(), "Tombstoned articles of deleted businesses");
        }
        Ok(orphans.len())
    }

    fn lock_links(&self) -> MutexGuard<'_, ()> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn require_business(&self, business_id: &str) -> StoreResult<()> {
        match self.businesses.find_by_id(business_id) {
            Some(business) if !business.is_tombstoned() => Ok(()),
            _ => Err(StoreError::MissingReference {
                business_id: business_id.to_string(),
            }),
        }
    }

    // ==================== Replication status ====================

    pub fn backlog(&self) -> Backlog {
        Backlog {
            businesses: CollectionBacklog::of(&self.businesses.snapshot()),
            articles: CollectionBacklog::of(&self.articles.snapshot()),
        }
    }

    // ==================== Export / Import ====================

    /// Dump both collections, replication metadata included
    pub fn export(&self) -> StoreDump {
        StoreDump {
            version: EXPORT_VERSION,
            exported_at: Utc::now(),
            businesses: self.businesses.dump(),
            articles: self.articles.dump(),
        }
    }

    /// Replace both collections with the contents of a dump
    ///
    /// The dump is checked as a whole first; on error the store is left
    /// exactly as it was.
    pub fn import(&self, dump: StoreDump) -> StoreResult<()> {
        let StoreDump {
            businesses,
            articles,
            ..
        } = dump;
        let counts = (businesses.len(), articles.len());

        let _links = self.lock_links();
        check_owners(&businesses, &articles)?;
        restore_both(&self.businesses, businesses, &self.articles, articles)?;

        info!(
            businesses = counts.0,
            articles = counts.1,
            "Imported store dump"
        );
        Ok(())
    }
}

/// Reject live articles a dump leaves without a live owner
///
/// An article owned by a tombstoned business is always rejected. An
/// article whose business is absent is only rejected while it was never
/// confirmed by the remote; confirmed ones mirror remote state.
fn check_owners(businesses: &[Business], articles: &[Article]) -> StoreResult<()> {
    let mut live = HashSet::new();
    let mut doomed = HashSet::new();
    for business in businesses {
        if business.is_tombstoned() {
            doomed.insert(business.id.as_str());
        } else {
            live.insert(business.id.as_str());
        }
    }

    let orphan = articles.iter().find(|article| {
        let owner = article.business_id.as_str();
        !article.is_tombstoned()
            && (doomed.contains(owner) || (article.is_pending() && !live.contains(owner)))
    });
    match orphan {
        Some(article) => Err(StoreError::MissingReference {
            business_id: article.business_id.clone(),
        }),
        None => Ok(()),
    }
}
