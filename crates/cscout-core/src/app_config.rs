use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Accepted bearer tokens for the API; empty disables auth in development.
    pub api_keys: Vec<String>,
    /// Base URL of the external content-discovery API.
    pub discovery_base_url: String,
    pub discovery_api_key: Option<String>,
    pub discovery_request_timeout_secs: u64,
    /// Chat-completions endpoint used for keyword expansion.
    pub generation_base_url: String,
    pub generation_api_key: Option<String>,
    pub generation_model: String,
    pub search_max_attempts: u32,
    pub search_backoff_base_ms: u64,
    pub search_backoff_cap_ms: u64,
    pub batch_stagger_ms: u64,
    pub batch_delay_floor_ms: u64,
    pub batch_delay_start_ms: u64,
    /// Wall-clock budget for one job; `timeout_at = created_at + this`.
    pub job_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub cache_sweep_max_age_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("api_keys", &format_args!("[{} redacted]", self.api_keys.len()))
            .field("discovery_base_url", &self.discovery_base_url)
            .field(
                "discovery_api_key",
                &self.discovery_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "discovery_request_timeout_secs",
                &self.discovery_request_timeout_secs,
            )
            .field("generation_base_url", &self.generation_base_url)
            .field(
                "generation_api_key",
                &self.generation_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("generation_model", &self.generation_model)
            .field("search_max_attempts", &self.search_max_attempts)
            .field("search_backoff_base_ms", &self.search_backoff_base_ms)
            .field("search_backoff_cap_ms", &self.search_backoff_cap_ms)
            .field("batch_stagger_ms", &self.batch_stagger_ms)
            .field("batch_delay_floor_ms", &self.batch_delay_floor_ms)
            .field("batch_delay_start_ms", &self.batch_delay_start_ms)
            .field("job_timeout_secs", &self.job_timeout_secs)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("cache_sweep_max_age_secs", &self.cache_sweep_max_age_secs)
            .finish()
    }
}
