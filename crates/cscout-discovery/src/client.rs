//! HTTP client for the discovery REST API.
//!
//! Wraps `reqwest` with API-key management and typed response
//! deserialization. Responses carrying an `"error"` field are surfaced as
//! [`DiscoveryError::Api`]; non-2xx statuses become
//! [`DiscoveryError::UnexpectedStatus`]. Every request-level failure is
//! tagged with the page index.

use std::time::Duration;

use reqwest::{Client, Url};
use serde::Deserialize;

use crate::error::DiscoveryError;

const DEFAULT_BASE_URL: &str = "https://api.discovry.io/v2/";

/// Records returned per search page. The executor stops paginating early
/// once a keyword's target is met, so a larger page only wastes quota.
pub const PAGE_SIZE: usize = 50;

/// One page of raw search records.
///
/// `items` stay as raw JSON here; the platform handler owns the shape and
/// normalizes each record into a [`cscout_core::Creator`].
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<String>,
}

/// Client for the discovery REST API.
///
/// Manages the HTTP client, API key, and base URL. Use [`DiscoveryClient::new`]
/// for production or [`DiscoveryClient::with_base_url`] to point at a mock
/// server in tests.
#[derive(Debug)]
pub struct DiscoveryClient {
    client: Client,
    api_key: Option<String>,
    base_url: Url,
}

impl DiscoveryClient {
    /// Creates a new client pointed at the production discovery API.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::InvalidRequest`] if the underlying
    /// `reqwest::Client` cannot be constructed.
    pub fn new(api_key: Option<&str>, timeout_secs: u64) -> Result<Self, DiscoveryError> {
        Self::with_base_url(api_key, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a new client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::InvalidRequest`] if the underlying
    /// `reqwest::Client` cannot be constructed or `base_url` is not a valid
    /// URL.
    pub fn with_base_url(
        api_key: Option<&str>,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, DiscoveryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("creatorscout/0.1 (creator-discovery)")
            .build()
            .map_err(|e| DiscoveryError::InvalidRequest(format!("HTTP client: {e}")))?;

        // Normalise: ensure the base URL ends with exactly one slash so that
        // join() appends the search path instead of replacing the last path
        // segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| {
            DiscoveryError::InvalidRequest(format!("invalid base URL '{base_url}': {e}"))
        })?;

        Ok(Self {
            client,
            api_key: api_key.map(ToOwned::to_owned),
            base_url,
        })
    }

    /// Fetches one page of search results for a keyword.
    ///
    /// `search_path` is the platform handler's endpoint path (e.g.
    /// `"tiktok/creators/search"`); pages are 1-based.
    ///
    /// # Errors
    ///
    /// - [`DiscoveryError::UnexpectedStatus`] on any non-2xx response.
    /// - [`DiscoveryError::Api`] if the body carries an error message.
    /// - [`DiscoveryError::Http`] on network failure.
    /// - [`DiscoveryError::Deserialize`] if the body does not match
    ///   [`SearchPage`].
    pub async fn fetch_page(
        &self,
        search_path: &str,
        keyword: &str,
        page: usize,
        per_page: usize,
    ) -> Result<SearchPage, DiscoveryError> {
        let mut url = self.base_url.join(search_path).map_err(|e| {
            DiscoveryError::InvalidRequest(format!("invalid search path '{search_path}': {e}"))
        })?;
        url.query_pairs_mut()
            .append_pair("q", keyword)
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &per_page.to_string());

        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|source| DiscoveryError::Http { page, source })?;
        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::UnexpectedStatus {
                status: status.as_u16(),
                page,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|source| DiscoveryError::Http { page, source })?;

        if let Ok(envelope) = serde_json::from_value::<ErrorEnvelope>(body.clone()) {
            if let Some(message) = envelope.error {
                return Err(DiscoveryError::Api { page, message });
            }
        }

        serde_json::from_value(body).map_err(|e| DiscoveryError::Deserialize {
            context: format!("search(keyword={keyword}, page={page})"),
            page,
            source: e,
        })
    }
}
