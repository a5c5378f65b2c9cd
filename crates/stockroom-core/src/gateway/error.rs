//! Gateway error handling
//!
//! Callers must tell these apart: an unavailable remote is retried on the
//! next trigger, a rejection is not retried blindly, and a revision
//! conflict is resolved by re-fetching the document.

use thiserror::Error;

use crate::models::CollectionName;

/// Errors returned by a remote document gateway
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Network failure, timeout, or the server is temporarily down
    #[error("Remote unavailable: {0}")]
    Unavailable(String),

    /// The server answered with a non-success status
    #[error("Remote rejected request with status {status}: {reason}")]
    Rejected { status: u16, reason: String },

    /// The server's current revision differs from the one we sent
    #[error("Revision conflict on {collection}/{id}")]
    RevisionConflict {
        collection: CollectionName,
        id: String,
    },

    /// The server answered with a body we could not understand
    #[error("Invalid response from remote: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Whether repeating the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }

    /// Whether the server reported the id already exists
    pub fn is_duplicate(&self) -> bool {
        matches!(self, GatewayError::Rejected { status: 409, .. })
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            GatewayError::InvalidResponse(error.to_string())
        } else {
            GatewayError::Unavailable(error.to_string())
        }
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;
