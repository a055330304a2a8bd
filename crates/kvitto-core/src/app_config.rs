use std::net::SocketAddr;
use std::path::PathBuf;

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
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    /// Path to the provider app registry (client ids/secrets per provider).
    pub providers_path: PathBuf,
    /// Per-request timeout for all upstream provider calls.
    pub provider_request_timeout_secs: u64,
    /// Retry attempts after the first failure for retryable errors.
    pub provider_max_retries: u32,
    /// Base delay for the exponential backoff ladder.
    pub provider_backoff_base_secs: u64,
    /// Wait before the single 429 retry when no Retry-After header is sent.
    pub rate_limit_default_wait_secs: u64,
    /// Cursor pagination safety cap per search window.
    pub provider_max_pages: usize,
    /// Location/device directory staleness TTL.
    pub directory_ttl_secs: u64,
    /// Transaction cache staleness TTL.
    pub transaction_cache_ttl_secs: u64,
    /// Symmetric reconciliation time window around the claimed timestamp.
    pub default_tolerance_minutes: i64,
    /// Safety margin before token expiry at which a refresh is triggered.
    pub token_refresh_margin_secs: i64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("providers_path", &self.providers_path)
            .field(
                "provider_request_timeout_secs",
                &self.provider_request_timeout_secs,
            )
            .field("provider_max_retries", &self.provider_max_retries)
            .field(
                "provider_backoff_base_secs",
                &self.provider_backoff_base_secs,
            )
            .field(
                "rate_limit_default_wait_secs",
                &self.rate_limit_default_wait_secs,
            )
            .field("provider_max_pages", &self.provider_max_pages)
            .field("directory_ttl_secs", &self.directory_ttl_secs)
            .field(
                "transaction_cache_ttl_secs",
                &self.transaction_cache_ttl_secs,
            )
            .field("default_tolerance_minutes", &self.default_tolerance_minutes)
            .field("token_refresh_margin_secs", &self.token_refresh_margin_secs)
            .finish()
    }
}
