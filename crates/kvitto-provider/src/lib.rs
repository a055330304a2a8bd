//! Provider adapters over heterogeneous POS APIs.
//!
//! Each adapter translates one provider's native shapes into the
//! canonical `kvitto-core` types and exposes the same operation set:
//! connection test, locations, devices, windowed transaction search with
//! cursor pagination, webhook CRUD, and signature validation. Nothing
//! downstream of this crate ever sees a provider-specific payload.

mod error;
mod http;
mod retry;
pub mod signature;
pub mod sumup;
mod token;
pub mod zettle;

pub use error::ProviderError;
pub use http::{HttpSettings, ProviderHttp};
pub use token::{StaticToken, StoreTokenSource, TokenSource};

use chrono::{DateTime, Utc};
use kvitto_core::{
    NormalizedDevice, NormalizedLocation, NormalizedTransaction, ProviderAppConfig, ProviderId,
};
use serde_json::Value;

use sumup::SumUpAdapter;
use zettle::ZettleAdapter;

/// Result of a windowed transaction search.
///
/// `pagination_capped` flags a partial window: the page cap was hit
/// before the cursor was exhausted. Callers decide whether partial data
/// is acceptable; it is never silently dropped.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub transactions: Vec<NormalizedTransaction>,
    pub pagination_capped: bool,
}

/// A provider-side webhook registration.
#[derive(Debug, Clone)]
pub struct WebhookSubscription {
    pub id: String,
    pub url: String,
    pub event_types: Vec<String>,
    pub active: bool,
}

/// Uniform handle over the configured provider adapters.
///
/// Enum dispatch rather than trait objects: the operation set is async
/// and the provider set is closed, so a match per call keeps everything
/// statically typed.
pub enum Provider<T: TokenSource> {
    Zettle(ZettleAdapter<T>),
    SumUp(SumUpAdapter<T>),
}

impl<T: TokenSource> Provider<T> {
    /// Builds the adapter matching the registry entry's provider id.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the HTTP client cannot be built.
    pub fn from_app_config(
        app: &ProviderAppConfig,
        tokens: T,
        settings: HttpSettings,
        max_pages: usize,
    ) -> Result<Self, ProviderError> {
        Ok(match app.provider {
            ProviderId::Zettle => {
                Provider::Zettle(ZettleAdapter::new(app, tokens, settings, max_pages)?)
            }
            ProviderId::SumUp => {
                Provider::SumUp(SumUpAdapter::new(app, tokens, settings, max_pages)?)
            }
        })
    }

    #[must_use]
    pub fn id(&self) -> ProviderId {
        match self {
            Provider::Zettle(_) => ProviderId::Zettle,
            Provider::SumUp(_) => ProviderId::SumUp,
        }
    }

    /// Cheap authenticated probe.
    ///
    /// # Errors
    ///
    /// Propagates any [`ProviderError`] from the adapter.
    pub async fn test_connection(&self) -> Result<(), ProviderError> {
        match self {
            Provider::Zettle(a) => a.test_connection().await,
            Provider::SumUp(a) => a.test_connection().await,
        }
    }

    /// Fetches all business locations.
    ///
    /// # Errors
    ///
    /// Propagates any [`ProviderError`] from the adapter.
    pub async fn get_locations(&self) -> Result<Vec<NormalizedLocation>, ProviderError> {
        match self {
            Provider::Zettle(a) => a.get_locations().await,
            Provider::SumUp(a) => a.get_locations().await,
        }
    }

    /// Fetches the devices registered at one location.
    ///
    /// # Errors
    ///
    /// Propagates any [`ProviderError`] from the adapter.
    pub async fn get_location_devices(
        &self,
        location_id: &str,
    ) -> Result<Vec<NormalizedDevice>, ProviderError> {
        match self {
            Provider::Zettle(a) => a.get_location_devices(location_id).await,
            Provider::SumUp(a) => a.get_location_devices(location_id).await,
        }
    }

    /// Fetches the full transaction window, aggregating cursor pages.
    ///
    /// # Errors
    ///
    /// Propagates any [`ProviderError`] from the adapter.
    pub async fn search_transactions(
        &self,
        location_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SearchOutcome, ProviderError> {
        match self {
            Provider::Zettle(a) => a.search_transactions(location_id, start, end).await,
            Provider::SumUp(a) => a.search_transactions(location_id, start, end).await,
        }
    }

    /// Fetches a single transaction by id.
    ///
    /// # Errors
    ///
    /// Propagates any [`ProviderError`] from the adapter.
    pub async fn get_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<NormalizedTransaction, ProviderError> {
        match self {
            Provider::Zettle(a) => a.get_transaction(transaction_id).await,
            Provider::SumUp(a) => a.get_transaction(transaction_id).await,
        }
    }

    /// Registers a webhook for the given event types.
    ///
    /// # Errors
    ///
    /// Propagates any [`ProviderError`] from the adapter.
    pub async fn create_webhook(
        &self,
        destination: &str,
        event_types: &[&str],
    ) -> Result<WebhookSubscription, ProviderError> {
        match self {
            Provider::Zettle(a) => a.create_webhook(destination, event_types).await,
            Provider::SumUp(a) => a.create_webhook(destination, event_types).await,
        }
    }

    /// Lists registered webhooks.
    ///
    /// # Errors
    ///
    /// Propagates any [`ProviderError`] from the adapter.
    pub async fn list_webhooks(&self) -> Result<Vec<WebhookSubscription>, ProviderError> {
        match self {
            Provider::Zettle(a) => a.list_webhooks().await,
            Provider::SumUp(a) => a.list_webhooks().await,
        }
    }

    /// Deletes a webhook registration.
    ///
    /// # Errors
    ///
    /// Propagates any [`ProviderError`] from the adapter.
    pub async fn delete_webhook(&self, webhook_id: &str) -> Result<(), ProviderError> {
        match self {
            Provider::Zettle(a) => a.delete_webhook(webhook_id).await,
            Provider::SumUp(a) => a.delete_webhook(webhook_id).await,
        }
    }

    /// Verifies a webhook delivery signature in constant time.
    #[must_use]
    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        match self {
            Provider::Zettle(a) => a.verify_webhook_signature(payload, signature),
            Provider::SumUp(a) => a.verify_webhook_signature(payload, signature),
        }
    }

    /// Normalizes a provider transaction payload (idempotently).
    ///
    /// # Errors
    ///
    /// Propagates deserialization/normalization errors from the adapter.
    pub fn normalize_transaction_value(
        &self,
        value: Value,
    ) -> Result<NormalizedTransaction, ProviderError> {
        normalize_transaction_value(self.id(), value)
    }
}

/// Normalizes a transaction payload for the given provider without an
/// adapter instance (webhook gateway path).
///
/// # Errors
///
/// Propagates deserialization/normalization errors from the adapter
/// module.
pub fn normalize_transaction_value(
    provider: ProviderId,
    value: Value,
) -> Result<NormalizedTransaction, ProviderError> {
    match provider {
        ProviderId::Zettle => zettle::normalize_transaction_value(value),
        ProviderId::SumUp => sumup::normalize_transaction_value(value),
    }
}
