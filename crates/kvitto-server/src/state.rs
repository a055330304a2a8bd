//! Shared application state and directory synchronization.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kvitto_auth::CredentialStore;
use kvitto_core::{AppConfig, NormalizedDevice, NormalizedLocation, ProviderRegistry};
use kvitto_directory::Directory;
use kvitto_match::{Matcher, TransactionCache};
use kvitto_provider::{HttpSettings, Provider, ProviderError, StoreTokenSource};
use kvitto_webhook::WebhookGateway;
use tokio::sync::RwLock;
use uuid::Uuid;

/// One merchant's live provider adapter.
pub type Connection = Arc<Provider<StoreTokenSource>>;

#[derive(Default)]
struct ConnState {
    providers: HashMap<Uuid, Connection>,
    /// Provider location id → owning credential, rebuilt on every sync.
    location_owner: HashMap<String, Uuid>,
}

/// Registry of onboarded merchant connections.
#[derive(Default)]
pub struct Connections {
    inner: RwLock<ConnState>,
}

impl Connections {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, credential_id: Uuid, provider: Connection) {
        self.inner
            .write()
            .await
            .providers
            .insert(credential_id, provider);
    }

    pub async fn remove(&self, credential_id: Uuid) {
        let mut state = self.inner.write().await;
        state.providers.remove(&credential_id);
        state.location_owner.retain(|_, owner| *owner != credential_id);
    }

    pub async fn all(&self) -> Vec<(Uuid, Connection)> {
        self.inner
            .read()
            .await
            .providers
            .iter()
            .map(|(id, p)| (*id, Arc::clone(p)))
            .collect()
    }

    /// The adapter serving a provider location, if its owning merchant is
    /// connected.
    pub async fn provider_for_location(&self, location_id: &str) -> Option<Connection> {
        let state = self.inner.read().await;
        let owner = state.location_owner.get(location_id)?;
        state.providers.get(owner).map(Arc::clone)
    }

    async fn replace_location_index(&self, index: HashMap<String, Uuid>) {
        self.inner.write().await.location_owner = index;
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<ProviderRegistry>,
    pub store: Arc<CredentialStore>,
    pub connections: Arc<Connections>,
    pub directory: Arc<Directory>,
    pub cache: Arc<TransactionCache>,
    pub matcher: Arc<Matcher>,
    pub gateway: Arc<WebhookGateway>,
}

impl AppState {
    #[must_use]
    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            timeout_secs: self.config.provider_request_timeout_secs,
            max_retries: self.config.provider_max_retries,
            backoff_base_secs: self.config.provider_backoff_base_secs,
            rate_limit_default_wait_secs: self.config.rate_limit_default_wait_secs,
        }
    }

    /// Builds a provider adapter bound to a stored credential.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the credential is unknown or the HTTP
    /// client cannot be built.
    pub async fn build_connection(&self, credential_id: Uuid) -> Result<Connection, ProviderError> {
        let credential = self.store.get(credential_id).await.ok_or(
            kvitto_auth::AuthError::UnknownCredential(credential_id),
        )?;
        let app = self.registry.get(credential.provider).ok_or_else(|| {
            ProviderError::Normalization {
                provider: credential.provider.to_string(),
                object_id: credential_id.to_string(),
                reason: "provider app not configured".to_owned(),
            }
        })?;

        let tokens = StoreTokenSource::new(Arc::clone(&self.store), credential_id);
        let provider = Provider::from_app_config(
            app,
            tokens,
            self.http_settings(),
            self.config.provider_max_pages,
        )?;
        Ok(Arc::new(provider))
    }
}

/// Rebuilds the directory snapshot from every connected merchant.
///
/// All-or-nothing: if any connection fails to list its locations or
/// devices the previous snapshot is kept and the sync is retried on the
/// next tick — replacing the snapshot with partial data would silently
/// drop the failed merchant's locations.
pub async fn sync_directory(state: &AppState, now: DateTime<Utc>) {
    let connections = state.connections.all().await;
    if connections.is_empty() {
        return;
    }

    let mut locations: Vec<NormalizedLocation> = Vec::new();
    let mut devices: Vec<NormalizedDevice> = Vec::new();
    let mut owner_index: HashMap<String, Uuid> = HashMap::new();

    for (credential_id, provider) in connections {
        let provider_locations = match provider.get_locations().await {
            Ok(locs) => locs,
            Err(e) => {
                tracing::error!(
                    provider = %provider.id(),
                    error = %e,
                    "directory sync: failed to list locations; keeping previous snapshot"
                );
                return;
            }
        };

        for loc in provider_locations {
            match provider.get_location_devices(&loc.id).await {
                Ok(devs) => devices.extend(devs),
                Err(e) => {
                    tracing::error!(
                        provider = %provider.id(),
                        location_id = %loc.id,
                        error = %e,
                        "directory sync: failed to list devices; keeping previous snapshot"
                    );
                    return;
                }
            }
            owner_index.insert(loc.id.clone(), credential_id);
            locations.push(loc);
        }
    }

    tracing::info!(
        locations = locations.len(),
        devices = devices.len(),
        "directory sync complete"
    );
    state.connections.replace_location_index(owner_index).await;
    state.directory.replace(locations, devices, now).await;
}
