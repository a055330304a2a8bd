use thiserror::Error;

/// Errors from provider API clients and adapters.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP 429. Carries the provider-requested wait; retried exactly once
    /// after waiting, outside the generic backoff ladder.
    #[error("rate limited by {provider} (retry after {retry_after_secs}s)")]
    RateLimited {
        provider: String,
        retry_after_secs: u64,
    },

    /// HTTP 401 that survived one token refresh and one retry.
    #[error("unauthorized by {provider} after token refresh")]
    Unauthorized { provider: String },

    /// Requested object does not exist upstream.
    #[error("not found: {url}")]
    NotFound { url: String },

    /// Any other non-2xx status. Statuses 408/5xx are retried through the
    /// backoff ladder before this surfaces; remaining 4xx are terminal.
    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// A provider payload is structurally valid but cannot be normalized.
    #[error("normalization error for {provider} object {object_id}: {reason}")]
    Normalization {
        provider: String,
        object_id: String,
        reason: String,
    },

    /// Credential lifecycle failure while obtaining a bearer token.
    #[error("auth error: {0}")]
    Auth(#[from] kvitto_auth::AuthError),
}

impl ProviderError {
    /// True when the reconciliation layer should report "provider
    /// unavailable, try again" rather than a hard failure.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http(_) | ProviderError::RateLimited { .. } => true,
            ProviderError::UnexpectedStatus { status, .. } => {
                matches!(status, 408 | 500 | 502 | 503 | 504)
            }
            ProviderError::Auth(e) => matches!(e, kvitto_auth::AuthError::Upstream { .. }),
            _ => false,
        }
    }
}
