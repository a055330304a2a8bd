//! In-memory credential store with single-flight token refresh.
//!
//! Each credential lives behind its own `tokio::sync::Mutex`. A refresh is
//! performed while holding that per-credential lock, so concurrent
//! [`CredentialStore::get_valid_access_token`] calls for the same expired
//! credential serialize: the first caller refreshes upstream, the rest
//! block, re-check freshness once they acquire the lock, and return the
//! already-refreshed token without a second upstream call. Unrelated
//! credentials never contend.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use kvitto_core::{ProviderId, ProviderRegistry};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AuthError;
use crate::oauth::OauthClient;

/// Per-merchant OAuth credential for one provider.
///
/// Owned exclusively by the [`CredentialStore`]; mutated only through
/// refresh/exchange, destroyed on merchant disconnect.
#[derive(Clone)]
pub struct ProviderCredential {
    pub id: Uuid,
    pub provider: ProviderId,
    pub merchant_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl ProviderCredential {
    /// True while the access token is still valid with `margin` to spare.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at - now > margin
    }
}

impl std::fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredential")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("merchant_id", &self.merchant_id)
            .field("access_token", &"[redacted]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Read-only store statistics for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStats {
    pub total: usize,
    /// Credentials whose access token is past (or within the refresh
    /// margin of) expiry.
    pub expiring: usize,
}

/// In-memory store of per-merchant provider credentials.
pub struct CredentialStore {
    oauth: OauthClient,
    registry: Arc<ProviderRegistry>,
    refresh_margin: Duration,
    // Outer lock guards only map shape; it is never held across an await.
    credentials: Mutex<HashMap<Uuid, Arc<Mutex<ProviderCredential>>>>,
}

impl CredentialStore {
    #[must_use]
    pub fn new(oauth: OauthClient, registry: Arc<ProviderRegistry>, refresh_margin: Duration) -> Self {
        Self {
            oauth,
            registry,
            refresh_margin,
            credentials: Mutex::new(HashMap::new()),
        }
    }

    /// Exchanges an authorization code and stores the resulting credential.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidGrant`] if the provider rejects the code.
    /// - [`AuthError::UnknownCredential`] never; other transport/shape
    ///   errors as raised by the token endpoint client.
    pub async fn onboard(
        &self,
        provider: ProviderId,
        merchant_id: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<Uuid, AuthError> {
        let app = self
            .registry
            .get(provider)
            .ok_or_else(|| AuthError::InvalidGrant {
                provider: provider.to_string(),
                reason: "provider not configured".to_owned(),
            })?;

        let credential = self
            .oauth
            .exchange_code(app, merchant_id, code, redirect_uri)
            .await?;
        let id = credential.id;

        self.credentials
            .lock()
            .await
            .insert(id, Arc::new(Mutex::new(credential)));
        Ok(id)
    }

    /// Inserts an existing credential (restore from persistence, tests).
    pub async fn insert(&self, credential: ProviderCredential) {
        self.credentials
            .lock()
            .await
            .insert(credential.id, Arc::new(Mutex::new(credential)));
    }

    /// Removes a credential on merchant disconnect.
    ///
    /// Returns `true` if a credential was stored under `id`.
    pub async fn remove(&self, id: Uuid) -> bool {
        self.credentials.lock().await.remove(&id).is_some()
    }

    /// Returns a snapshot of the credential (tokens redacted in `Debug`).
    pub async fn get(&self, id: Uuid) -> Option<ProviderCredential> {
        let slot = self.slot(id).await?;
        let guard = slot.lock().await;
        Some(guard.clone())
    }

    /// Returns a currently-valid access token, refreshing if the stored
    /// one expires within the refresh margin.
    ///
    /// Single-flight: concurrent callers for the same credential share one
    /// upstream refresh.
    ///
    /// # Errors
    ///
    /// - [`AuthError::UnknownCredential`] if `id` is not stored.
    /// - [`AuthError::RefreshFailed`] if the provider rejects the refresh
    ///   token — fatal for this credential, not retried.
    pub async fn get_valid_access_token(&self, id: Uuid) -> Result<String, AuthError> {
        let slot = self
            .slot(id)
            .await
            .ok_or(AuthError::UnknownCredential(id))?;

        let mut guard = slot.lock().await;

        // Re-check after acquiring: a caller that lost the race finds the
        // token already refreshed and returns it as-is.
        if guard.is_fresh(Utc::now(), self.refresh_margin) {
            return Ok(guard.access_token.clone());
        }

        let app = self
            .registry
            .get(guard.provider)
            .ok_or_else(|| AuthError::RefreshFailed {
                provider: guard.provider.to_string(),
                reason: "provider not configured".to_owned(),
            })?;

        let refreshed = self.oauth.refresh(app, &guard).await?;
        *guard = refreshed;
        Ok(guard.access_token.clone())
    }

    /// Forces a refresh regardless of expiry (after an upstream 401).
    ///
    /// Still single-flight: a caller that lost the race to a concurrent
    /// refresh gets the new token without a second upstream call, detected
    /// by the token changing while waiting for the lock.
    ///
    /// # Errors
    ///
    /// Same as [`CredentialStore::get_valid_access_token`].
    pub async fn refresh_after_unauthorized(
        &self,
        id: Uuid,
        rejected_token: &str,
    ) -> Result<String, AuthError> {
        let slot = self
            .slot(id)
            .await
            .ok_or(AuthError::UnknownCredential(id))?;

        let mut guard = slot.lock().await;

        if guard.access_token != rejected_token {
            // Someone else already replaced the rejected token.
            return Ok(guard.access_token.clone());
        }

        let app = self
            .registry
            .get(guard.provider)
            .ok_or_else(|| AuthError::RefreshFailed {
                provider: guard.provider.to_string(),
                reason: "provider not configured".to_owned(),
            })?;

        let refreshed = self.oauth.refresh(app, &guard).await?;
        *guard = refreshed;
        Ok(guard.access_token.clone())
    }

    /// Read-only statistics for the monitoring endpoint.
    pub async fn stats(&self) -> CredentialStats {
        let now = Utc::now();
        let map = self.credentials.lock().await;
        let mut expiring = 0usize;
        for slot in map.values() {
            // try_lock: a slot locked for refresh is by definition expiring.
            match slot.try_lock() {
                Ok(guard) if guard.is_fresh(now, self.refresh_margin) => {}
                _ => expiring += 1,
            }
        }
        CredentialStats {
            total: map.len(),
            expiring,
        }
    }

    async fn slot(&self, id: Uuid) -> Option<Arc<Mutex<ProviderCredential>>> {
        self.credentials.lock().await.get(&id).map(Arc::clone)
    }
}
