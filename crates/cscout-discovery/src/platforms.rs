//! Platform handler registry.
//!
//! Each platform the discovery API can search gets one [`PlatformHandler`]
//! implementation owning its endpoint path, its raw record shape, and a
//! hint for the keyword-expansion prompt. Everything else in the system
//! works against the trait.

use std::collections::HashMap;

use serde::Deserialize;

use cscout_core::{Creator, Platform};

/// Per-platform capability surface: where to search, how to read a raw
/// record, and how to steer keyword expansion.
pub trait PlatformHandler: Send + Sync {
    /// Endpoint path under the discovery API base URL.
    fn search_path(&self) -> &'static str;

    /// Normalizes one raw search record into a [`Creator`].
    ///
    /// Must never fail: unknown or missing fields get neutral defaults so
    /// the aggregator downstream never sees nulls.
    fn normalize(&self, raw: &serde_json::Value, source_keyword: &str) -> Creator;

    /// Short platform descriptor injected into the expansion prompt.
    fn expansion_hint(&self) -> &'static str;
}

/// Maps [`Platform`] variants to their handlers. Adding a platform is
/// adding a `register` call in [`HandlerRegistry::with_defaults`].
pub struct HandlerRegistry {
    handlers: HashMap<Platform, Box<dyn PlatformHandler>>,
}

impl HandlerRegistry {
    /// Builds the registry with all built-in platform handlers.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
        };
        registry.register(Platform::TikTok, Box::new(TikTokHandler));
        registry.register(Platform::Instagram, Box::new(InstagramHandler));
        registry.register(Platform::YouTube, Box::new(YouTubeHandler));
        registry
    }

    pub fn register(&mut self, platform: Platform, handler: Box<dyn PlatformHandler>) {
        self.handlers.insert(platform, handler);
    }

    /// Every [`Platform`] variant has a default handler, so lookups only
    /// miss for platforms registered nowhere — a programming error surfaced
    /// at the validation boundary, not here.
    #[must_use]
    pub fn get(&self, platform: Platform) -> Option<&dyn PlatformHandler> {
        self.handlers.get(&platform).map(AsRef::as_ref)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_owned()
    } else {
        value
    }
}

// ---------------------------------------------------------------------------
// TikTok
// ---------------------------------------------------------------------------

struct TikTokHandler;

#[derive(Debug, Default, Deserialize)]
struct RawTikTokCreator {
    #[serde(default)]
    id: String,
    #[serde(default)]
    unique_id: String,
    #[serde(default)]
    nickname: String,
    #[serde(default)]
    avatar_url: String,
    #[serde(default)]
    signature: String,
    #[serde(default)]
    follower_count: i64,
    #[serde(default)]
    verified: bool,
}

impl PlatformHandler for TikTokHandler {
    fn search_path(&self) -> &'static str {
        "tiktok/creators/search"
    }

    fn normalize(&self, raw: &serde_json::Value, source_keyword: &str) -> Creator {
        let raw: RawTikTokCreator = serde_json::from_value(raw.clone()).unwrap_or_default();
        Creator {
            platform_id: raw.id,
            external_id: String::new(),
            username: raw.unique_id,
            display_name: non_empty_or(raw.nickname, "N/A"),
            avatar_url: raw.avatar_url,
            bio: raw.signature,
            follower_count: raw.follower_count.max(0),
            verified: raw.verified,
            source_keyword: source_keyword.to_owned(),
        }
    }

    fn expansion_hint(&self) -> &'static str {
        "TikTok short-form video creators; favor hashtag-style and trend vocabulary"
    }
}

// ---------------------------------------------------------------------------
// Instagram
// ---------------------------------------------------------------------------

struct InstagramHandler;

#[derive(Debug, Default, Deserialize)]
struct RawInstagramCreator {
    #[serde(default)]
    pk: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    profile_pic_url: String,
    #[serde(default)]
    biography: String,
    #[serde(default)]
    follower_count: i64,
    #[serde(default)]
    is_verified: bool,
}

impl PlatformHandler for InstagramHandler {
    fn search_path(&self) -> &'static str {
        "instagram/creators/search"
    }

    fn normalize(&self, raw: &serde_json::Value, source_keyword: &str) -> Creator {
        let raw: RawInstagramCreator = serde_json::from_value(raw.clone()).unwrap_or_default();
        Creator {
            platform_id: raw.pk,
            external_id: String::new(),
            username: raw.username,
            display_name: non_empty_or(raw.full_name, "N/A"),
            avatar_url: raw.profile_pic_url,
            bio: raw.biography,
            follower_count: raw.follower_count.max(0),
            verified: raw.is_verified,
            source_keyword: source_keyword.to_owned(),
        }
    }

    fn expansion_hint(&self) -> &'static str {
        "Instagram visual creators; favor lifestyle and aesthetic vocabulary"
    }
}

// ---------------------------------------------------------------------------
// YouTube
// ---------------------------------------------------------------------------

struct YouTubeHandler;

#[derive(Debug, Default, Deserialize)]
struct RawYouTubeChannel {
    #[serde(default)]
    channel_id: String,
    #[serde(default)]
    custom_url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    thumbnail_url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    subscriber_count: i64,
}

impl PlatformHandler for YouTubeHandler {
    fn search_path(&self) -> &'static str {
        "youtube/channels/search"
    }

    fn normalize(&self, raw: &serde_json::Value, source_keyword: &str) -> Creator {
        let raw: RawYouTubeChannel = serde_json::from_value(raw.clone()).unwrap_or_default();
        Creator {
            // YouTube exposes no numeric profile id; the channel id is the
            // secondary identifier and the handle carries identity.
            platform_id: String::new(),
            external_id: raw.channel_id,
            username: raw.custom_url.trim_start_matches('@').to_owned(),
            display_name: non_empty_or(raw.title, "N/A"),
            avatar_url: raw.thumbnail_url,
            bio: raw.description,
            follower_count: raw.subscriber_count.max(0),
            verified: false,
            source_keyword: source_keyword.to_owned(),
        }
    }

    fn expansion_hint(&self) -> &'static str {
        "YouTube long-form channels; favor topic and tutorial vocabulary"
    }
}
