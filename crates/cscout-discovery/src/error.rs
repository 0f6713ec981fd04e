use thiserror::Error;

/// Errors returned by the discovery API client.
///
/// Every request-level failure is tagged with the 1-based page it happened
/// on, so retry bookkeeping can count the pages an attempt actually fetched
/// before dying.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// A request could not even be built (bad base URL or search path).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error fetching page {page}: {source}")]
    Http {
        page: usize,
        #[source]
        source: reqwest::Error,
    },

    /// The API returned an application-level error message.
    #[error("discovery API error on page {page}: {message}")]
    Api { page: usize, message: String },

    /// Non-success HTTP status.
    #[error("unexpected HTTP status {status} fetching page {page}")]
    UnexpectedStatus { status: u16, page: usize },

    /// The response body could not be deserialized into the expected shape.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        page: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl DiscoveryError {
    /// API requests the failed attempt sent: every page before the failing
    /// one succeeded, and the failing request itself still hit the API.
    #[must_use]
    pub fn api_calls_spent(&self) -> u64 {
        match self {
            Self::InvalidRequest(_) => 0,
            Self::Http { page, .. }
            | Self::Api { page, .. }
            | Self::UnexpectedStatus { page, .. }
            | Self::Deserialize { page, .. } => u64::try_from(*page).unwrap_or(u64::MAX),
        }
    }
}
