//! Retry wrapper around single-keyword searches.
//!
//! Converts a fallible [`cscout_discovery::search_keyword`] call into an
//! always-returning [`KeywordOutcome`]: exhausted retries yield an empty
//! creator list plus the last error string instead of an `Err`, so one bad
//! keyword can never sink its batch. The result cache sits in front — a hit
//! costs zero API calls and skips retries entirely.

use std::time::Duration;

use cscout_core::{AppConfig, Creator};
use cscout_discovery::{search_keyword, DiscoveryClient, PlatformHandler};

use crate::cache::TtlCache;

/// Attempt and backoff knobs.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 15_000,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.search_max_attempts,
            backoff_base_ms: config.search_backoff_base_ms,
            backoff_cap_ms: config.search_backoff_cap_ms,
        }
    }
}

/// The terminal result of one keyword's search, success or not.
#[derive(Debug, Clone)]
pub struct KeywordOutcome {
    pub keyword: String,
    pub creators: Vec<Creator>,
    /// API calls spent across every attempt; 0 on a cache hit.
    pub api_calls: u64,
    /// Last attempt's error when all attempts failed.
    pub error: Option<String>,
}

impl KeywordOutcome {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Exponential backoff with multiplicative jitter, capped.
fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = policy
        .backoff_base_ms
        .saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
    let jittered = (exp as f64 * (1.0 + rand::random::<f64>() * 0.5)) as u64;
    Duration::from_millis(jittered.min(policy.backoff_cap_ms))
}

fn result_cache_key(search_path: &str, keyword: &str, target: usize) -> String {
    format!("{search_path}|{}|{target}", keyword.trim().to_lowercase())
}

/// Runs one keyword's search through the cache and the retry loop.
pub async fn search_with_retry(
    client: &DiscoveryClient,
    handler: &dyn PlatformHandler,
    cache: &dyn TtlCache<Vec<Creator>>,
    policy: &RetryPolicy,
    keyword: &str,
    target: usize,
) -> KeywordOutcome {
    let cache_key = result_cache_key(handler.search_path(), keyword, target);
    if let Some(creators) = cache.get(&cache_key) {
        tracing::debug!(keyword, cached = creators.len(), "search result cache hit");
        return KeywordOutcome {
            keyword: keyword.to_owned(),
            creators,
            api_calls: 0,
            error: None,
        };
    }

    let max_attempts = policy.max_attempts.max(1);
    let mut api_calls = 0u64;
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match search_keyword(client, handler, keyword, target).await {
            Ok(found) => {
                api_calls += found.api_calls;
                cache.set(cache_key, found.creators.clone());
                return KeywordOutcome {
                    keyword: found.keyword,
                    creators: found.creators,
                    api_calls,
                    error: None,
                };
            }
            Err(error) => {
                // Pages fetched before the failure, plus the failing request.
                api_calls += error.api_calls_spent();
                last_error = error.to_string();
                tracing::warn!(
                    keyword,
                    attempt,
                    max_attempts,
                    error = %last_error,
                    "keyword search attempt failed"
                );
                if attempt < max_attempts {
                    tokio::time::sleep(backoff_delay(policy, attempt)).await;
                }
            }
        }
    }

    KeywordOutcome {
        keyword: keyword.to_owned(),
        creators: Vec::new(),
        api_calls,
        error: Some(last_error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_with_bounded_jitter() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 60_000,
        };

        for _ in 0..50 {
            let first = backoff_delay(&policy, 1).as_millis();
            assert!((1_000..1_500).contains(&first), "first delay {first}");

            let second = backoff_delay(&policy, 2).as_millis();
            assert!((2_000..3_000).contains(&second), "second delay {second}");
        }
    }

    #[test]
    fn backoff_respects_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 5_000,
        };
        for attempt in 1..=10 {
            assert!(backoff_delay(&policy, attempt).as_millis() <= 5_000);
        }
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let policy = RetryPolicy {
            max_attempts: u32::MAX,
            backoff_base_ms: u64::MAX / 2,
            backoff_cap_ms: 1_000,
        };
        assert_eq!(backoff_delay(&policy, u32::MAX).as_millis(), 1_000);
    }

    #[tokio::test]
    async fn failed_attempt_counts_pages_fetched_before_the_failure() {
        use wiremock::matchers::{method, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        use crate::cache::MemoryTtlCache;
        use cscout_core::Platform;
        use cscout_discovery::HandlerRegistry;

        let server = MockServer::start().await;
        let full_page = serde_json::json!({
            "items": (0..50).map(|i| serde_json::json!({
                "id": i.to_string(),
                "unique_id": format!("user{i}"),
                "nickname": format!("Creator {i}"),
                "follower_count": 1000,
                "verified": false
            })).collect::<Vec<_>>(),
            "has_more": true
        });
        Mock::given(method("GET"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&full_page))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = DiscoveryClient::with_base_url(None, 5, &server.uri()).expect("client");
        let registry = HandlerRegistry::with_defaults();
        let handler = registry.get(Platform::TikTok).expect("handler");
        let cache = MemoryTtlCache::new(Duration::from_secs(60), Duration::from_secs(60));
        let policy = RetryPolicy {
            max_attempts: 1,
            backoff_base_ms: 0,
            backoff_cap_ms: 0,
        };

        let outcome = search_with_retry(&client, handler, &cache, &policy, "coffee", 100).await;

        assert!(!outcome.succeeded());
        // Page 1 succeeded before page 2 failed; both hit the API.
        assert_eq!(outcome.api_calls, 2);
    }

    #[test]
    fn cache_key_folds_keyword_case_and_whitespace() {
        assert_eq!(
            result_cache_key("tiktok/creators/search", "  Coffee Roaster ", 100),
            result_cache_key("tiktok/creators/search", "coffee roaster", 100),
        );
        assert_ne!(
            result_cache_key("tiktok/creators/search", "coffee", 100),
            result_cache_key("tiktok/creators/search", "coffee", 50),
        );
        assert_ne!(
            result_cache_key("tiktok/creators/search", "coffee", 100),
            result_cache_key("instagram/creators/search", "coffee", 100),
        );
    }
}
