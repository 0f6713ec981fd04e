use thiserror::Error;

mod app_config;
mod config;
pub mod creator;
pub mod job;
pub mod platform;
pub mod strategy;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use creator::Creator;
pub use job::{BatchingStats, JobMetadata, JobStatus, KeywordYield, TargetTier};
pub use platform::Platform;
pub use strategy::{KeywordStrategy, MAX_COMBINED_KEYWORDS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for env var {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
