//! HTTP gateway for a CouchDB-style document service
//!
//! Each collection is a database under the base URL. Documents carry an
//! `_id`/`_rev` envelope which is stripped before the body reaches the
//! engine.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{
    Anonymous, BasicAuth, CredentialProvider, GatewayError, GatewayResult, RemoteDocument,
    RemoteGateway,
};
use crate::config::Config;
use crate::models::{CollectionName, Revision};

#[derive(Debug, Deserialize)]
struct AllDocsResponse {
    rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
struct AllDocsRow {
    id: String,
    #[serde(default)]
    doc: Option<Value>,
}

/// Greeting served at the service root
#[derive(Debug, Deserialize)]
struct WelcomeResponse {
    couchdb: String,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    rev: String,
}

/// Gateway backed by the remote service's HTTP API
pub struct HttpGateway {
    base: Url,
    client: Client,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpGateway {
    /// Create a gateway for `base_url`
    pub fn new(
        base_url: &str,
        credentials: Arc<dyn CredentialProvider>,
        timeout: Duration,
    ) -> GatewayResult<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| GatewayError::InvalidResponse(format!("invalid base URL: {}", e)))?;
        if base.cannot_be_a_base() {
            return Err(GatewayError::InvalidResponse(format!(
                "base URL cannot hold paths: {}",
                base_url
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base,
            client,
            credentials,
        })
    }

    /// Build a gateway from configuration; requires `remote_url`
    pub fn from_config(config: &Config) -> Result<Self> {
        let url = config
            .remote_url
            .as_deref()
            .ok_or_else(|| anyhow!("remote_url is not configured"))?;

        let credentials: Arc<dyn CredentialProvider> = match BasicAuth::from_config(config) {
            Some(auth) => Arc::new(auth),
            None => Arc::new(Anonymous),
        };

        Self::new(url, credentials, config.request_timeout())
            .with_context(|| format!("Failed to create gateway for {}", url))
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(header::ACCEPT, "application/json");
        match self.credentials.authorization() {
            Some(value) => builder.header(header::AUTHORIZATION, value),
            None => builder,
        }
    }

    async fn read_revision(response: Response) -> GatewayResult<Revision> {
        let body: WriteResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        Ok(Revision::new(body.rev))
    }
}

/// Body sent on writes: wire fields plus the `_id` (and `_rev` for updates)
fn envelope(id: &str, body: &Value, revision: Option<&Revision>) -> Value {
    let mut map = match body {
        Value::Object(fields) => fields.clone(),
        _ => Map::new(),
    };
    map.insert("_id".to_string(), Value::String(id.to_string()));
    if let Some(rev) = revision {
        map.insert("_rev".to_string(), Value::String(rev.to_string()));
    }
    Value::Object(map)
}

/// Split a remote document into id, revision and wire fields
fn strip_envelope(doc: Value) -> GatewayResult<RemoteDocument> {
    let Value::Object(mut map) = doc else {
        return Err(GatewayError::InvalidResponse(
            "document is not an object".to_string(),
        ));
    };

    let id = match map.remove("_id") {
        Some(Value::String(id)) => id,
        _ => return Err(GatewayError::InvalidResponse("document without _id".to_string())),
    };
    let revision = match map.remove("_rev") {
        Some(Value::String(rev)) => rev,
        _ => {
            return Err(GatewayError::InvalidResponse(format!(
                "document {} without _rev",
                id
            )))
        }
    };
    map.retain(|key, _| !key.starts_with('_'));

    Ok(RemoteDocument::new(id, revision, Value::Object(map)))
}

/// Map a non-success response to the error taxonomy
async fn status_error(
    response: Response,
    collection: CollectionName,
    id: &str,
    conflict_means_revision: bool,
) -> GatewayError {
    let status = response.status();
    let reason = response.text().await.unwrap_or_default();

    match status {
        StatusCode::CONFLICT if conflict_means_revision => GatewayError::RevisionConflict {
            collection,
            id: id.to_string(),
        },
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            GatewayError::Unavailable(format!("{} {}", status.as_u16(), reason.trim()))
        }
        _ => GatewayError::Rejected {
            status: status.as_u16(),
            reason: reason.trim().to_string(),
        },
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn probe(&self) -> bool {
        let response = match self.request(Method::GET, self.base.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "Probe failed");
                return false;
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!(%status, "Probe rejected");
            return false;
        }

        // A proxy or captive portal can answer 200 too
        match response.json::<WelcomeResponse>().await {
            Ok(welcome) if welcome.couchdb == "Welcome" => true,
            Ok(welcome) => {
                debug!(greeting = %welcome.couchdb, "Probe answered by an unknown service");
                false
            }
            Err(e) => {
                debug!(%status, error = %e, "Probe answered without a service greeting");
                false
            }
        }
    }

    async fn list_all(&self, collection: CollectionName) -> Vec<RemoteDocument> {
        let mut url = self.endpoint(&[collection.remote_name(), "_all_docs"]);
        url.query_pairs_mut().append_pair("include_docs", "true");

        let response = match self.request(Method::GET, url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(%collection, status = %response.status(), "Listing rejected, treating as empty");
                return Vec::new();
            }
            Err(e) => {
                warn!(%collection, error = %e, "Listing failed, treating as empty");
                return Vec::new();
            }
        };

        let listing: AllDocsResponse = match response.json().await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(%collection, error = %e, "Malformed listing, treating as empty");
                return Vec::new();
            }
        };

        listing
            .rows
            .into_iter()
            .filter(|row| !row.id.starts_with("_design/"))
            .filter_map(|row| {
                let doc = row.doc?;
                match strip_envelope(doc) {
                    Ok(remote) => Some(remote),
                    Err(e) => {
                        warn!(%collection, id = %row.id, error = %e, "Skipping listed document");
                        None
                    }
                }
            })
            .collect()
    }

    async fn fetch(
        &self,
        collection: CollectionName,
        id: &str,
    ) -> GatewayResult<Option<RemoteDocument>> {
        let url = self.endpoint(&[collection.remote_name(), id]);
        let response = self.request(Method::GET, url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response, collection, id, false).await);
        }

        let doc: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        strip_envelope(doc).map(Some)
    }

    async fn create(
        &self,
        collection: CollectionName,
        id: &str,
        body: &Value,
    ) -> GatewayResult<Revision> {
        let url = self.endpoint(&[collection.remote_name()]);
        let response = self
            .request(Method::POST, url)
            .json(&envelope(id, body, None))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response, collection, id, false).await);
        }
        Self::read_revision(response).await
    }

    async fn update(
        &self,
        collection: CollectionName,
        id: &str,
        body: &Value,
        known_revision: &Revision,
    ) -> GatewayResult<Revision> {
        let mut url = self.endpoint(&[collection.remote_name(), id]);
        url.query_pairs_mut()
            .append_pair("rev", known_revision.as_str());
        let response = self
            .request(Method::PUT, url)
            .json(&envelope(id, body, Some(known_revision)))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response, collection, id, true).await);
        }
        Self::read_revision(response).await
    }

    async fn delete(
        &self,
        collection: CollectionName,
        id: &str,
        known_revision: &Revision,
    ) -> GatewayResult<()> {
        let mut url = self.endpoint(&[collection.remote_name(), id]);
        url.query_pairs_mut()
            .append_pair("rev", known_revision.as_str());
        let response = self.request(Method::DELETE, url).send().await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(status_error(response, collection, id, true).await)
    }
}
