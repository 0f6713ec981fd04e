//! Fan-in: merges per-keyword outcomes into the job's final creator list.
//!
//! Deduplication is first-seen-wins in keyword order, keyed by
//! [`cscout_core::Creator::identity_key`]. Records with no resolvable
//! identity are discarded; by the accounting rule `duplicates_removed =
//! total_fetched - unique`, they count against duplicates.

use std::collections::HashSet;

use cscout_core::{Creator, KeywordYield};

use crate::retry::KeywordOutcome;

#[derive(Debug, Clone)]
pub struct Aggregation {
    /// Deduplicated creators, capped at the job target.
    pub creators: Vec<Creator>,
    pub total_fetched: usize,
    pub duplicates_removed: usize,
    /// Per-keyword contribution, in keyword order.
    pub keyword_yields: Vec<KeywordYield>,
}

#[must_use]
pub fn aggregate(outcomes: &[KeywordOutcome], cap: usize) -> Aggregation {
    let mut seen: HashSet<String> = HashSet::new();
    let mut creators: Vec<Creator> = Vec::new();
    let mut keyword_yields = Vec::with_capacity(outcomes.len());
    let mut total_fetched = 0usize;

    for outcome in outcomes {
        let fetched = outcome.creators.len();
        total_fetched += fetched;
        let mut unique = 0usize;

        for creator in &outcome.creators {
            let Some(key) = creator.identity_key() else {
                continue;
            };
            if seen.insert(key) {
                unique += 1;
                creators.push(creator.clone());
            }
        }

        keyword_yields.push(KeywordYield {
            keyword: outcome.keyword.clone(),
            unique,
            fetched,
        });
    }

    let duplicates_removed = total_fetched - creators.len();
    creators.truncate(cap);

    Aggregation {
        creators,
        total_fetched,
        duplicates_removed,
        keyword_yields,
    }
}

/// Unique creators delivered per API call; 0.0 when nothing was called.
#[must_use]
pub fn efficiency(unique: usize, total_api_calls: u64) -> f64 {
    if total_api_calls == 0 {
        0.0
    } else {
        unique as f64 / total_api_calls as f64
    }
}
