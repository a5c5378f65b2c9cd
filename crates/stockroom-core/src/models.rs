//! Data models for Stockroom
//!
//! Defines the two replicated collections, Business and Article, and the
//! replication metadata every document carries.
//!
//! Local documents are serialized whole (fields plus metadata) into the
//! SQLite store. The remote service only ever sees the wire fields; its
//! `_id`/`_rev` envelope is handled by the gateway.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gateway::RemoteDocument;

/// Maximum length of ids and names, mirrored from the collection schemas
pub const MAX_FIELD_LEN: usize = 100;

/// The replicated collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionName {
    Businesses,
    Articles,
}

impl CollectionName {
    /// Name used for local storage and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionName::Businesses => "businesses",
            CollectionName::Articles => "articles",
        }
    }

    /// Database name on the remote document service
    pub fn remote_name(&self) -> &'static str {
        match self {
            CollectionName::Businesses => "business",
            CollectionName::Articles => "articles",
        }
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque version token assigned by the remote service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Revision {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Revision {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Replication metadata shared by every document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncMeta {
    /// Last revision confirmed by the remote; `None` while pending
    #[serde(default)]
    pub revision: Option<Revision>,
    /// Slated for deletion, not yet purged
    #[serde(default)]
    pub tombstoned: bool,
    /// Edited locally since the revision was attached
    #[serde(default)]
    pub modified: bool,
}

/// A document stored in a replicated collection
///
/// Implementors expose their metadata through [`Document::meta`]; the
/// remaining methods describe validation, partial updates and the mapping
/// to and from the remote wire form.
pub trait Document:
    Clone + fmt::Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Partial field update accepted by `Collection::update`
    type Patch: Send;

    const COLLECTION: CollectionName;

    fn id(&self) -> &str;
    fn meta(&self) -> &SyncMeta;
    fn meta_mut(&mut self) -> &mut SyncMeta;

    /// Merge a partial update; the id is never part of a patch
    fn apply_patch(&mut self, patch: Self::Patch);

    /// Check the collection schema
    fn validate(&self) -> Result<(), String>;

    /// Wire fields sent to the remote (no `_id`/`_rev`)
    fn to_remote(&self) -> serde_json::Value;

    /// Build a local document from a remote one, revision attached
    fn from_remote(remote: &RemoteDocument) -> Result<Self, String>;

    /// Overwrite local fields from a remote copy
    fn overwrite_fields(&mut self, remote: &RemoteDocument) -> Result<(), String>;

    fn revision(&self) -> Option<&Revision> {
        self.meta().revision.as_ref()
    }

    fn is_pending(&self) -> bool {
        self.meta().revision.is_none()
    }

    fn is_tombstoned(&self) -> bool {
        self.meta().tombstoned
    }

    fn is_modified(&self) -> bool {
        self.meta().modified
    }

    /// Whether the push phase has work for this document
    fn needs_push(&self) -> bool {
        let meta = self.meta();
        meta.tombstoned || meta.revision.is_none() || meta.modified
    }
}

/// A business owning articles
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Business {
    /// Client-generated identifier
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub meta: SyncMeta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Business {
    /// Create a new pending business with a fresh id
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), name)
    }

    /// Create a business with a specific id
    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            meta: SyncMeta::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update for a business
#[derive(Debug, Clone, Default)]
pub struct BusinessPatch {
    pub name: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct BusinessWire {
    name: String,
}

impl Document for Business {
    type Patch = BusinessPatch;

    const COLLECTION: CollectionName = CollectionName::Businesses;

    fn id(&self) -> &str {
        &self.id
    }

    fn meta(&self) -> &SyncMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut SyncMeta {
        &mut self.meta
    }

    fn apply_patch(&mut self, patch: BusinessPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        self.updated_at = Utc::now();
    }

    fn validate(&self) -> Result<(), String> {
        check_text("id", &self.id)?;
        check_text("name", &self.name)
    }

    fn to_remote(&self) -> serde_json::Value {
        serde_json::json!({ "name": self.name })
    }

    fn from_remote(remote: &RemoteDocument) -> Result<Self, String> {
        let mut business = Business::with_id(remote.id.clone(), String::new());
        business.overwrite_fields(remote)?;
        business.meta.revision = Some(remote.revision.clone());
        Ok(business)
    }

    fn overwrite_fields(&mut self, remote: &RemoteDocument) -> Result<(), String> {
        let wire: BusinessWire = remote.decode_body()?;
        self.name = wire.name;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// An article sold by a business
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub id: String,
    pub name: String,
    pub quantity: u64,
    pub unit_price: f64,
    /// Owning business
    pub business_id: String,
    #[serde(flatten)]
    pub meta: SyncMeta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create an article
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub name: String,
    pub quantity: u64,
    pub unit_price: f64,
    pub business_id: String,
}

impl Article {
    /// Create a new pending article with a fresh id
    pub fn new(new: NewArticle) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), new)
    }

    /// Create an article with a specific id
    pub fn with_id(id: impl Into<String>, new: NewArticle) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: new.name,
            quantity: new.quantity,
            unit_price: new.unit_price,
            business_id: new.business_id,
            meta: SyncMeta::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Total stock value
    pub fn stock_value(&self) -> f64 {
        self.quantity as f64 * self.unit_price
    }
}

/// Partial update for an article
#[derive(Debug, Clone, Default)]
pub struct ArticlePatch {
    pub name: Option<String>,
    pub quantity: Option<u64>,
    pub unit_price: Option<f64>,
    pub business_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ArticleWire {
    name: String,
    qty: u64,
    selling_price: f64,
    business_id: String,
}

impl Document for Article {
    type Patch = ArticlePatch;

    const COLLECTION: CollectionName = CollectionName::Articles;

    fn id(&self) -> &str {
        &self.id
    }

    fn meta(&self) -> &SyncMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut SyncMeta {
        &mut self.meta
    }

    fn apply_patch(&mut self, patch: ArticlePatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(quantity) = patch.quantity {
            self.quantity = quantity;
        }
        if let Some(unit_price) = patch.unit_price {
            self.unit_price = unit_price;
        }
        if let Some(business_id) = patch.business_id {
            self.business_id = business_id;
        }
        self.updated_at = Utc::now();
    }

    fn validate(&self) -> Result<(), String> {
        check_text("id", &self.id)?;
        check_text("name", &self.name)?;
        check_text("business_id", &self.business_id)?;
        if !self.unit_price.is_finite() || self.unit_price < 0.0 {
            return Err(format!(
                "unit_price must be a non-negative number, got {}",
                self.unit_price
            ));
        }
        Ok(())
    }

    fn to_remote(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "qty": self.quantity,
            "selling_price": self.unit_price,
            "business_id": self.business_id,
        })
    }

    fn from_remote(remote: &RemoteDocument) -> Result<Self, String> {
        let mut article = Article::with_id(
            remote.id.clone(),
            NewArticle {
                name: String::new(),
                quantity: 0,
                unit_price: 0.0,
                business_id: String::new(),
            },
        );
        article.overwrite_fields(remote)?;
        article.meta.revision = Some(remote.revision.clone());
        Ok(article)
    }

    fn overwrite_fields(&mut self, remote: &RemoteDocument) -> Result<(), String> {
        let wire: ArticleWire = remote.decode_body()?;
        self.name = wire.name;
        self.quantity = wire.qty;
        self.unit_price = wire.selling_price;
        self.business_id = wire.business_id;
        self.updated_at = Utc::now();
        Ok(())
    }
}

fn check_text(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} cannot be empty", field));
    }
    if value.chars().count() > MAX_FIELD_LEN {
        return Err(format!(
            "{} exceeds {} characters",
            field, MAX_FIELD_LEN
        ));
    }
    Ok(())
}
