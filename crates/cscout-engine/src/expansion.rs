//! Keyword expansion.
//!
//! One seed keyword goes to a generation model and comes back as four
//! labeled groups (primary, semantic, trending, niche), which
//! [`cscout_core::KeywordStrategy`] folds into the working list. Expansion
//! is best-effort: any model failure degrades to the deterministic fallback
//! strategy, so a job never fails because the model was down.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use cscout_core::{KeywordStrategy, Platform};

use crate::cache::TtlCache;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str = "You generate search keywords for finding social media creators. \
    Given a seed keyword and a platform, respond with closely related keyword groups. \
    Keep each keyword between 3 and 49 characters and avoid placeholders.";

#[derive(Debug, Error)]
pub enum ExpansionError {
    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("generation API returned status {0}")]
    UnexpectedStatus(u16),
    #[error("malformed generation response: {0}")]
    Malformed(String),
}

/// The model's raw answer, before strategy post-processing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeywordGroups {
    #[serde(default)]
    pub primary: Vec<String>,
    #[serde(default)]
    pub semantic: Vec<String>,
    #[serde(default)]
    pub trending: Vec<String>,
    #[serde(default)]
    pub niche: Vec<String>,
}

/// A model that can expand one seed keyword into [`KeywordGroups`].
#[async_trait]
pub trait KeywordModel: Send + Sync {
    async fn expand(&self, seed: &str, platform_hint: &str)
        -> Result<KeywordGroups, ExpansionError>;
}

/// [`KeywordModel`] backed by an OpenAI-compatible chat-completions endpoint
/// using structured output, so the answer is guaranteed to be a JSON object
/// matching [`KeywordGroups`] — no prose to scrape.
pub struct GenerationClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl GenerationClient {
    /// Creates a client against the production endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ExpansionError::Http`] if the HTTP client cannot be built.
    pub fn new(
        api_key: Option<&str>,
        model: &str,
        timeout_secs: u64,
    ) -> Result<Self, ExpansionError> {
        Self::with_base_url(api_key, model, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ExpansionError::Http`] if the HTTP client cannot be built.
    pub fn with_base_url(
        api_key: Option<&str>,
        model: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, ExpansionError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .connect_timeout(std::time::Duration::from_secs(10))
            .user_agent("creatorscout/0.1 (keyword-expansion)")
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.map(ToOwned::to_owned),
            base_url: base_url.trim_end_matches('/').to_owned(),
            model: model.to_owned(),
        })
    }

    fn request_body(&self, seed: &str, platform_hint: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": format!("Seed keyword: {seed}\nPlatform: {platform_hint}")
                }
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "keyword_groups",
                    "strict": true,
                    "schema": {
                        "type": "object",
                        "properties": {
                            "primary":  { "type": "array", "items": { "type": "string" } },
                            "semantic": { "type": "array", "items": { "type": "string" } },
                            "trending": { "type": "array", "items": { "type": "string" } },
                            "niche":    { "type": "array", "items": { "type": "string" } }
                        },
                        "required": ["primary", "semantic", "trending", "niche"],
                        "additionalProperties": false
                    }
                }
            }
        })
    }
}

#[async_trait]
impl KeywordModel for GenerationClient {
    async fn expand(
        &self,
        seed: &str,
        platform_hint: &str,
    ) -> Result<KeywordGroups, ExpansionError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut request = self.client.post(&url).json(&self.request_body(seed, platform_hint));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExpansionError::UnexpectedStatus(status.as_u16()));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExpansionError::Malformed(format!("response envelope: {e}")))?;

        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| ExpansionError::Malformed("no choices in response".to_owned()))?;

        serde_json::from_str(content)
            .map_err(|e| ExpansionError::Malformed(format!("keyword groups payload: {e}")))
    }
}

/// Cached, fallback-protected expansion.
pub struct ExpansionEngine {
    model: Arc<dyn KeywordModel>,
    cache: Arc<dyn TtlCache<KeywordStrategy>>,
}

impl ExpansionEngine {
    #[must_use]
    pub fn new(model: Arc<dyn KeywordModel>, cache: Arc<dyn TtlCache<KeywordStrategy>>) -> Self {
        Self { model, cache }
    }

    /// Evicts aged strategy entries. Returns how many were dropped.
    pub fn sweep_cache(&self) -> usize {
        self.cache.sweep()
    }

    /// Expands `seed` into a strategy. Infallible: a model failure, and a
    /// degenerate expansion that adds nothing beyond the seed, both resolve
    /// to [`KeywordStrategy::fallback`]. Only genuine model output is cached.
    pub async fn expand(&self, seed: &str, platform: Platform, platform_hint: &str) -> KeywordStrategy {
        let key = strategy_cache_key(platform, seed);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(seed, %platform, "strategy cache hit");
            return hit;
        }

        match self.model.expand(seed, platform_hint).await {
            Ok(groups) => {
                let strategy = KeywordStrategy::from_groups(
                    seed,
                    groups.primary,
                    groups.semantic,
                    groups.trending,
                    groups.niche,
                );
                if strategy.combined.len() > 1 {
                    self.cache.set(key, strategy.clone());
                    strategy
                } else {
                    tracing::warn!(seed, "expansion produced no usable keywords; using fallback");
                    KeywordStrategy::fallback(seed)
                }
            }
            Err(error) => {
                tracing::warn!(seed, %error, "keyword expansion failed; using fallback");
                KeywordStrategy::fallback(seed)
            }
        }
    }
}

fn strategy_cache_key(platform: Platform, seed: &str) -> String {
    format!("{}|{}", platform.as_str(), seed.trim().to_lowercase())
}
