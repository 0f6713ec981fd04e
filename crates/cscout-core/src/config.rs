use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files — useful for testing
/// or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual environment
/// so it can be tested with a pure `HashMap` lookup — no `set_var`/`remove_var` needed.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let database_url = require("DATABASE_URL")?;

    let env = parse_environment(&or_default("CSCOUT_ENV", "development"));
    let bind_addr = parse_addr("CSCOUT_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("CSCOUT_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("CSCOUT_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("CSCOUT_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("CSCOUT_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let api_keys: Vec<String> = or_default("CSCOUT_API_KEYS", "")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect();

    let discovery_base_url = or_default("CSCOUT_DISCOVERY_BASE_URL", "https://api.discovry.io/v2");
    let discovery_api_key = lookup("CSCOUT_DISCOVERY_API_KEY").ok();
    let discovery_request_timeout_secs = parse_u64("CSCOUT_DISCOVERY_TIMEOUT_SECS", "30")?;

    let generation_base_url = or_default("CSCOUT_GENERATION_BASE_URL", "https://api.openai.com/v1");
    let generation_api_key = lookup("CSCOUT_GENERATION_API_KEY").ok();
    let generation_model = or_default("CSCOUT_GENERATION_MODEL", "gpt-4o-mini");

    let search_max_attempts = parse_u32("CSCOUT_SEARCH_MAX_ATTEMPTS", "3")?;
    let search_backoff_base_ms = parse_u64("CSCOUT_SEARCH_BACKOFF_BASE_MS", "1000")?;
    let search_backoff_cap_ms = parse_u64("CSCOUT_SEARCH_BACKOFF_CAP_MS", "15000")?;

    let batch_stagger_ms = parse_u64("CSCOUT_BATCH_STAGGER_MS", "150")?;
    let batch_delay_floor_ms = parse_u64("CSCOUT_BATCH_DELAY_FLOOR_MS", "500")?;
    let batch_delay_start_ms = parse_u64("CSCOUT_BATCH_DELAY_START_MS", "2000")?;

    let job_timeout_secs = parse_u64("CSCOUT_JOB_TIMEOUT_SECS", "600")?;
    let cache_ttl_secs = parse_u64("CSCOUT_CACHE_TTL_SECS", "300")?;
    let cache_sweep_max_age_secs = parse_u64("CSCOUT_CACHE_SWEEP_MAX_AGE_SECS", "600")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        api_keys,
        discovery_base_url,
        discovery_api_key,
        discovery_request_timeout_secs,
        generation_base_url,
        generation_api_key,
        generation_model,
        search_max_attempts,
        search_backoff_base_ms,
        search_backoff_cap_ms,
        batch_stagger_ms,
        batch_delay_floor_ms,
        batch_delay_start_ms,
        job_timeout_secs,
        cache_ttl_secs,
        cache_sweep_max_age_secs,
    })
}

/// Parse the deployment environment, defaulting to development on unknown values.
fn parse_environment(raw: &str) -> Environment {
    match raw.to_ascii_lowercase().as_str() {
        "production" | "prod" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
