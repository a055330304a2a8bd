//! Bearer token supply for provider API clients.

use std::sync::Arc;

use kvitto_auth::{AuthError, CredentialStore};
use uuid::Uuid;

/// Source of bearer tokens for outgoing provider requests.
///
/// Implemented by the credential store (refreshing, single-flight) and by
/// [`StaticToken`] for tests and long-lived API keys.
pub trait TokenSource: Send + Sync {
    /// Returns a currently-valid bearer token.
    fn bearer(&self) -> impl std::future::Future<Output = Result<String, AuthError>> + Send;

    /// Reports that `rejected` was refused with a 401 and returns a
    /// replacement token. Must be single-flight per credential.
    fn invalidate(
        &self,
        rejected: &str,
    ) -> impl std::future::Future<Output = Result<String, AuthError>> + Send;
}

/// Token source backed by a stored OAuth credential.
#[derive(Clone)]
pub struct StoreTokenSource {
    store: Arc<CredentialStore>,
    credential_id: Uuid,
}

impl StoreTokenSource {
    #[must_use]
    pub fn new(store: Arc<CredentialStore>, credential_id: Uuid) -> Self {
        Self {
            store,
            credential_id,
        }
    }
}

impl TokenSource for StoreTokenSource {
    async fn bearer(&self) -> Result<String, AuthError> {
        self.store.get_valid_access_token(self.credential_id).await
    }

    async fn invalidate(&self, rejected: &str) -> Result<String, AuthError> {
        self.store
            .refresh_after_unauthorized(self.credential_id, rejected)
            .await
    }
}

/// Fixed token that cannot be refreshed. A 401 with a static token is
/// terminal.
#[derive(Clone)]
pub struct StaticToken(pub String);

impl TokenSource for StaticToken {
    async fn bearer(&self) -> Result<String, AuthError> {
        Ok(self.0.clone())
    }

    async fn invalidate(&self, _rejected: &str) -> Result<String, AuthError> {
        Ok(self.0.clone())
    }
}
