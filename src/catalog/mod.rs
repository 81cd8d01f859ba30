//! Catalog provider clients
//!
//! Each provider speaks its own HTTP/JSON dialect. Both are normalised into
//! `CandidateSummary` and `CatalogRecord` behind the `CatalogClient` trait so
//! the resolver never sees provider-specific shapes. Clients are stateless
//! and never retry; retry and timeout policy belongs to the resolver.

pub mod gamedb;
pub mod model;
pub mod storefront;

pub use gamedb::GameDbClient;
pub use model::{
    CandidateSummary, CatalogRecord, Locale, LookupKey, Provider, RelatedRecord, SearchOptions,
};
pub use storefront::StorefrontClient;

use async_trait::async_trait;
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors a catalog provider can report
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// The provider had no matching record (or an empty search result)
    #[error("Not found: {0}")]
    NotFound(String),

    /// The provider answered, but with a failure or an unreadable body
    #[error("Upstream error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    /// No response was obtained: connection fault or timeout
    #[error("Transport error: {0}")]
    Transport(String),
}

impl CatalogError {
    /// Whether a retry could plausibly produce a different answer
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CatalogError::NotFound(_))
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return CatalogError::Upstream {
                status: err.status().map(|s| s.as_u16()).unwrap_or(200),
                message: format!("Failed to parse response: {}", err),
            };
        }
        match err.status() {
            Some(StatusCode::NOT_FOUND) => CatalogError::NotFound(err.to_string()),
            Some(status) => CatalogError::Upstream {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => CatalogError::Transport(err.to_string()),
        }
    }
}

/// A remote game catalog
///
/// `search` returns candidates in the provider's own relevance order and
/// fails with `NotFound` rather than returning an empty list.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Provider behind this client
    fn provider(&self) -> Provider;

    /// Searches the catalog for `term`
    async fn search(
        &self,
        term: &str,
        options: &SearchOptions,
    ) -> Result<Vec<CandidateSummary>, CatalogError>;

    /// Fetches the full record for a provider id
    async fn fetch_detail(
        &self,
        id: &str,
        options: &SearchOptions,
    ) -> Result<CatalogRecord, CatalogError>;
}

/// Classifies an HTTP response and decodes its JSON body
///
/// `what` names the requested resource for `NotFound` messages.
pub(crate) async fn decode_response<T: DeserializeOwned>(
    response: Response,
    what: &str,
) -> Result<T, CatalogError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(CatalogError::NotFound(what.to_string()));
    }

    let text = response.text().await?;
    if !status.is_success() {
        return Err(CatalogError::Upstream {
            status: status.as_u16(),
            message: truncate(&text, 200),
        });
    }

    parse_body(&text, status.as_u16())
}

/// Appends `segments` to `base_url` as percent-encoded path segments
///
/// Ids are opaque: a `?`, `#` or `/` inside one stays part of its segment
/// instead of starting a query, a fragment or another path level.
pub(crate) fn endpoint_url(base_url: &str, segments: &[&str]) -> Result<Url, CatalogError> {
    let mut url = Url::parse(base_url).map_err(|e| {
        CatalogError::Transport(format!("Invalid base URL '{}': {}", base_url, e))
    })?;
    url.path_segments_mut()
        .map_err(|_| CatalogError::Transport(format!("Base URL '{}' cannot take a path", base_url)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Decodes a JSON body, reporting failures as upstream errors
pub(crate) fn parse_body<T: DeserializeOwned>(text: &str, status: u16) -> Result<T, CatalogError> {
    serde_json::from_str(text).map_err(|e| CatalogError::Upstream {
        status,
        message: format!("Failed to parse response: {}", e),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
