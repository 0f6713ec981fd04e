use serde::{Deserialize, Serialize};

/// A creator profile normalized from one platform's raw search records.
///
/// Creators only exist inside a result snapshot or in memory during
/// aggregation — they are not independently persisted. Missing upstream
/// fields are defaulted at normalization time (counts to 0, strings to
/// empty/`"N/A"`) so the aggregator never sees nulls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Creator {
    /// Platform-native profile ID, empty when the platform omitted it.
    #[serde(default)]
    pub platform_id: String,
    /// Secondary identifier some platforms expose (channel ID, pk, etc.).
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub follower_count: i64,
    #[serde(default)]
    pub verified: bool,
    /// The keyword whose search surfaced this creator.
    #[serde(default)]
    pub source_keyword: String,
}

impl Creator {
    /// Resolves the identity key used for cross-keyword deduplication.
    ///
    /// Candidates are tried in order — platform ID, external ID, then the
    /// trimmed lower-cased username — and the first non-empty one wins.
    /// Returns `None` when no candidate resolves; such records cannot be
    /// deduplicated and are dropped by the aggregator.
    #[must_use]
    pub fn identity_key(&self) -> Option<String> {
        let platform_id = self.platform_id.trim();
        if !platform_id.is_empty() {
            return Some(format!("id:{platform_id}"));
        }
        let external_id = self.external_id.trim();
        if !external_id.is_empty() {
            return Some(format!("ext:{external_id}"));
        }
        let username = self.username.trim();
        if !username.is_empty() {
            return Some(format!("user:{}", username.to_lowercase()));
        }
        None
    }
}
