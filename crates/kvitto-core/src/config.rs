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
    use std::path::PathBuf;

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

    let parse_i64 = |var: &str, default: &str| -> Result<i64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<i64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let env = parse_environment(&or_default("KVITTO_ENV", "development"));
    let bind_addr = parse_addr("KVITTO_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("KVITTO_LOG_LEVEL", "info");
    let providers_path = PathBuf::from(or_default(
        "KVITTO_PROVIDERS_PATH",
        "./config/providers.yaml",
    ));

    let provider_request_timeout_secs = parse_u64("KVITTO_PROVIDER_REQUEST_TIMEOUT_SECS", "30")?;
    let provider_max_retries = parse_u32("KVITTO_PROVIDER_MAX_RETRIES", "4")?;
    let provider_backoff_base_secs = parse_u64("KVITTO_PROVIDER_BACKOFF_BASE_SECS", "1")?;
    let rate_limit_default_wait_secs = parse_u64("KVITTO_RATE_LIMIT_DEFAULT_WAIT_SECS", "5")?;
    let provider_max_pages = parse_usize("KVITTO_PROVIDER_MAX_PAGES", "50")?;

    let directory_ttl_secs = parse_u64("KVITTO_DIRECTORY_TTL_SECS", "600")?;
    let transaction_cache_ttl_secs = parse_u64("KVITTO_TRANSACTION_CACHE_TTL_SECS", "300")?;
    let default_tolerance_minutes = parse_i64("KVITTO_DEFAULT_TOLERANCE_MINUTES", "2")?;
    let token_refresh_margin_secs = parse_i64("KVITTO_TOKEN_REFRESH_MARGIN_SECS", "60")?;

    Ok(AppConfig {
        env,
        bind_addr,
        log_level,
        providers_path,
        provider_request_timeout_secs,
        provider_max_retries,
        provider_backoff_base_secs,
        rate_limit_default_wait_secs,
        provider_max_pages,
        directory_ttl_secs,
        transaction_cache_ttl_secs,
        default_tolerance_minutes,
        token_refresh_margin_secs,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}
