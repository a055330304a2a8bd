//! Token endpoint client: authorization-code exchange and refresh.
//!
//! Both operations are plain form POSTs against the provider's token URL.
//! Provider-level rejections (`invalid_grant` and friends) are mapped to
//! fatal, non-retryable [`AuthError`] variants; only transport errors are
//! ever worth retrying, and that decision belongs to the caller.

use std::time::Duration;

use chrono::Utc;
use kvitto_core::ProviderAppConfig;
use serde::Deserialize;

use crate::error::AuthError;
use crate::ProviderCredential;

/// Raw token endpoint response (RFC 6749 §5.1).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    /// Lifetime in seconds from now.
    expires_in: i64,
}

/// Error body shape shared by both providers' token endpoints (RFC 6749 §5.2).
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// HTTP client for provider token endpoints.
pub struct OauthClient {
    client: reqwest::Client,
}

impl OauthClient {
    /// Creates a token endpoint client with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(timeout_secs: u64) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("kvitto/0.1 (pos-reconciliation)")
            .build()?;
        Ok(Self { client })
    }

    /// Exchanges a one-shot authorization code for a credential.
    ///
    /// Never retried: authorization codes are single-use, so a retry after
    /// an ambiguous failure could only ever fail with `invalid_grant`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidGrant`] if the provider rejects the code.
    /// - [`AuthError::Http`] on transport failure.
    /// - [`AuthError::Deserialize`] on an unexpected response shape.
    pub async fn exchange_code(
        &self,
        app: &ProviderAppConfig,
        merchant_id: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<ProviderCredential, AuthError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", &app.client_id),
            ("client_secret", &app.client_secret),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        let token = self.post_token(app, &form, true).await?;

        tracing::info!(
            provider = %app.provider,
            merchant_id,
            "authorization code exchanged"
        );

        Ok(ProviderCredential {
            id: uuid::Uuid::new_v4(),
            provider: app.provider,
            merchant_id: merchant_id.to_owned(),
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
        })
    }

    /// Refreshes an expiring credential, returning its replacement.
    ///
    /// The returned credential keeps the old id and merchant binding. If
    /// the provider does not rotate the refresh token, the old one is
    /// carried over.
    ///
    /// # Errors
    ///
    /// - [`AuthError::RefreshFailed`] if the provider rejects the refresh
    ///   token (fatal for this credential).
    /// - [`AuthError::NoRefreshToken`] if the credential cannot be refreshed.
    /// - [`AuthError::Http`] on transport failure.
    pub async fn refresh(
        &self,
        app: &ProviderAppConfig,
        credential: &ProviderCredential,
    ) -> Result<ProviderCredential, AuthError> {
        let refresh_token =
            credential
                .refresh_token
                .as_deref()
                .ok_or(AuthError::NoRefreshToken {
                    credential_id: credential.id,
                })?;

        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", &app.client_id),
            ("client_secret", &app.client_secret),
            ("refresh_token", refresh_token),
        ];

        let token = self.post_token(app, &form, false).await?;

        tracing::info!(
            provider = %app.provider,
            credential_id = %credential.id,
            "access token refreshed"
        );

        Ok(ProviderCredential {
            access_token: token.access_token,
            refresh_token: token
                .refresh_token
                .or_else(|| credential.refresh_token.clone()),
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
            ..credential.clone()
        })
    }

    /// POSTs a form to the token URL and parses the response, mapping
    /// 4xx bodies to the appropriate fatal error.
    async fn post_token(
        &self,
        app: &ProviderAppConfig,
        form: &[(&str, &str)],
        is_exchange: bool,
    ) -> Result<TokenResponse, AuthError> {
        let provider = app.provider.to_string();
        let response = self.client.post(&app.token_url).form(form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_client_error() {
            let reason = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| e.error_description.unwrap_or(e.error))
                .unwrap_or_else(|_| format!("HTTP {status}"));
            return Err(if is_exchange {
                AuthError::InvalidGrant { provider, reason }
            } else {
                AuthError::RefreshFailed { provider, reason }
            });
        }

        if !status.is_success() {
            return Err(AuthError::Upstream {
                provider,
                status: status.as_u16(),
            });
        }

        serde_json::from_str(&body).map_err(|e| AuthError::Deserialize {
            provider,
            source: e,
        })
    }
}
