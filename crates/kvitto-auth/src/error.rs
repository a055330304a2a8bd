use thiserror::Error;

/// Errors from the OAuth lifecycle.
///
/// [`AuthError::InvalidGrant`] and [`AuthError::RefreshFailed`] are fatal
/// for the credential and must never be retried automatically — the
/// merchant has to re-authorize.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Network or TLS failure talking to the token endpoint.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider rejected the authorization code. Codes are single-use;
    /// the exchange is never retried.
    #[error("authorization code exchange rejected by {provider}: {reason}")]
    InvalidGrant { provider: String, reason: String },

    /// The provider rejected the refresh token. Fatal for this credential;
    /// surfaced to the merchant for re-authorization.
    #[error("token refresh rejected by {provider}: {reason}")]
    RefreshFailed { provider: String, reason: String },

    /// The credential has no refresh token but the access token expired.
    #[error("credential {credential_id} has no refresh token")]
    NoRefreshToken { credential_id: uuid::Uuid },

    /// No credential stored under this id.
    #[error("unknown credential: {0}")]
    UnknownCredential(uuid::Uuid),

    /// The token endpoint failed transiently (5xx). Not fatal for the
    /// credential; the caller may try again later.
    #[error("token endpoint for {provider} returned HTTP {status}")]
    Upstream { provider: String, status: u16 },

    /// The token endpoint answered with an unexpected shape.
    #[error("malformed token response from {provider}: {source}")]
    Deserialize {
        provider: String,
        #[source]
        source: serde_json::Error,
    },
}
