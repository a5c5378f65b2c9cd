//! Storage error handling
//!
//! Provides typed errors for local store operations. Key errors
//! (`DuplicateKey`, `NotFound`) are surfaced synchronously to the caller;
//! the rest wrap persistence failures.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::CollectionName;

/// Errors that can occur during local store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// A document with this id already exists in the collection
    #[error("Document '{id}' already exists in {collection}")]
    DuplicateKey {
        collection: CollectionName,
        id: String,
    },

    /// No document with this id exists in the collection
    #[error("Document '{id}' not found in {collection}")]
    NotFound {
        collection: CollectionName,
        id: String,
    },

    /// The document does not satisfy the collection schema
    #[error("Invalid document '{id}' in {collection}: {reason}")]
    Invalid {
        collection: CollectionName,
        id: String,
        reason: String,
    },

    /// An article references a business that does not exist or is tombstoned
    #[error("Business '{business_id}' does not exist or is being deleted")]
    MissingReference { business_id: String },

    /// Failed to create data directory
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored or imported document could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the error was caused by the caller's input rather than the store
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            StoreError::DuplicateKey { .. }
                | StoreError::NotFound { .. }
                | StoreError::Invalid { .. }
                | StoreError::MissingReference { .. }
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StoreError::MissingReference { .. } => {
                Some("Create the business first, or check the id with `stockroom business list`.")
            }
            StoreError::CreateDirectory { .. } => {
                Some("Check that the parent directory exists and you have write permissions.")
            }
            StoreError::Database(_) => {
                Some("The database may be locked by another process or corrupted.")
            }
            _ => None,
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_errors_are_user_errors() {
        let err = StoreError::DuplicateKey {
            collection: CollectionName::Businesses,
            id: "b1".to_string(),
        };
        assert!(err.is_user_error());
        assert!(err.recovery_suggestion().is_none());

        let err = StoreError::Database(rusqlite::Error::InvalidQuery);
        assert!(!err.is_user_error());
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::NotFound {
            collection: CollectionName::Articles,
            id: "a1".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("a1"));
        assert!(msg.contains("articles"));

        let err = StoreError::CreateDirectory {
            path: PathBuf::from("/test/dir"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/test/dir"));
    }
}
