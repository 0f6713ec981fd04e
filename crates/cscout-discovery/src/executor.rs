//! Single-keyword search execution.
//!
//! Paginates one keyword against the discovery API until the keyword's
//! target count is met, the API reports no further pages, or a page comes
//! back empty. Retries are deliberately NOT handled here — the engine's
//! retry wrapper owns attempt bookkeeping — so any failure propagates as a
//! typed [`DiscoveryError`] carrying the page it happened on.

use cscout_core::Creator;

use crate::client::{DiscoveryClient, PAGE_SIZE};
use crate::error::DiscoveryError;
use crate::platforms::PlatformHandler;

/// The outcome of one keyword's (successful) search.
#[derive(Debug, Clone)]
pub struct KeywordSearch {
    pub keyword: String,
    pub creators: Vec<Creator>,
    /// Pages fetched; the retry wrapper accumulates this across attempts.
    pub api_calls: u64,
}

/// Runs one keyword's search to completion.
///
/// # Errors
///
/// Propagates any [`DiscoveryError`] from the client; partial pages fetched
/// before the failure are discarded (the retry wrapper restarts the keyword
/// from page 1, and the result cache makes repeats cheap).
pub async fn search_keyword(
    client: &DiscoveryClient,
    handler: &dyn PlatformHandler,
    keyword: &str,
    target: usize,
) -> Result<KeywordSearch, DiscoveryError> {
    let mut creators: Vec<Creator> = Vec::with_capacity(target);
    let mut api_calls = 0u64;
    let mut page = 1usize;

    loop {
        let per_page = PAGE_SIZE.min(target.saturating_sub(creators.len()).max(1));
        let result = client
            .fetch_page(handler.search_path(), keyword, page, per_page)
            .await?;
        api_calls += 1;

        if result.items.is_empty() {
            break;
        }

        for raw in &result.items {
            creators.push(handler.normalize(raw, keyword));
            if creators.len() >= target {
                break;
            }
        }

        if creators.len() >= target || !result.has_more {
            break;
        }
        page += 1;
    }

    tracing::debug!(
        keyword,
        found = creators.len(),
        target,
        api_calls,
        "keyword search finished"
    );

    Ok(KeywordSearch {
        keyword: keyword.to_owned(),
        creators,
        api_calls,
    })
}
