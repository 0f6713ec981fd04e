//! Client for the external content-discovery API.
//!
//! One [`DiscoveryClient`] serves every platform; per-platform request paths
//! and raw-record shapes live behind the [`PlatformHandler`] registry, so
//! adding a platform means registering a handler rather than growing a
//! string-matched branch chain.

mod client;
mod error;
mod executor;
mod platforms;

pub use client::{DiscoveryClient, SearchPage, PAGE_SIZE};
pub use error::DiscoveryError;
pub use executor::{search_keyword, KeywordSearch};
pub use platforms::{HandlerRegistry, PlatformHandler};
