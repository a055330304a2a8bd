//! Zettle adapter: purchases, locations, readers, webhook subscriptions.

mod normalize;
mod types;

pub use normalize::normalize_transaction_value;

use chrono::{DateTime, Utc};
use kvitto_core::{
    NormalizedDevice, NormalizedLocation, NormalizedTransaction, ProviderAppConfig, ProviderId,
};
use serde_json::Value;

use crate::error::ProviderError;
use crate::http::{HttpSettings, ProviderHttp};
use crate::signature::verify_signature;
use crate::token::TokenSource;
use crate::{SearchOutcome, WebhookSubscription};

use types::{ZettleDevice, ZettleLocation, ZettlePurchasesResponse, ZettleSubscription};

/// Page size requested from the purchases feed.
const PAGE_LIMIT: u32 = 200;

/// Adapter over the Zettle REST API.
pub struct ZettleAdapter<T: TokenSource> {
    http: ProviderHttp<T>,
    base_url: String,
    webhook_secret: String,
    max_pages: usize,
}

impl<T: TokenSource> ZettleAdapter<T> {
    /// Creates the adapter from the provider app registration.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the HTTP client cannot be built.
    pub fn new(
        app: &ProviderAppConfig,
        tokens: T,
        settings: HttpSettings,
        max_pages: usize,
    ) -> Result<Self, ProviderError> {
        let http = ProviderHttp::new(ProviderId::Zettle, tokens, settings)?;
        Ok(Self {
            http,
            base_url: app.api_base_url.trim_end_matches('/').to_owned(),
            webhook_secret: app.webhook_secret.clone(),
            max_pages,
        })
    }

    /// Cheap authenticated probe used by onboarding to confirm the
    /// credential works.
    ///
    /// # Errors
    ///
    /// Propagates any [`ProviderError`] from the underlying request.
    pub async fn test_connection(&self) -> Result<(), ProviderError> {
        let url = format!("{}/organizations/self", self.base_url);
        self.http.get(&url, &[]).await?;
        Ok(())
    }

    /// Fetches all business locations.
    ///
    /// # Errors
    ///
    /// Propagates any [`ProviderError`] from the underlying request.
    pub async fn get_locations(&self) -> Result<Vec<NormalizedLocation>, ProviderError> {
        let url = format!("{}/organizations/self/locations", self.base_url);
        let body = self.http.get(&url, &[]).await?;
        let raw: Vec<ZettleLocation> = parse(body, "zettle locations")?;
        Ok(raw.into_iter().map(normalize::normalize_location).collect())
    }

    /// Fetches the card readers registered at one location.
    ///
    /// # Errors
    ///
    /// Propagates any [`ProviderError`] from the underlying request.
    pub async fn get_location_devices(
        &self,
        location_id: &str,
    ) -> Result<Vec<NormalizedDevice>, ProviderError> {
        let url = format!(
            "{}/organizations/self/locations/{location_id}/devices",
            self.base_url
        );
        let body = self.http.get(&url, &[]).await?;
        let raw: Vec<ZettleDevice> = parse(body, "zettle devices")?;
        Ok(raw.into_iter().map(normalize::normalize_device).collect())
    }

    /// Fetches all purchases for a location in `[start, end]`, following
    /// the `lastPurchaseHash` cursor until exhausted or the page cap.
    ///
    /// When the cap is hit the aggregated pages so far are returned with
    /// `pagination_capped = true` — partial data is flagged, never
    /// silently truncated.
    ///
    /// # Errors
    ///
    /// Propagates any [`ProviderError`] from the underlying requests.
    pub async fn search_transactions(
        &self,
        location_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SearchOutcome, ProviderError> {
        let url = format!("{}/purchases/v2", self.base_url);
        let mut transactions = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;
        let mut pagination_capped = false;

        loop {
            if pages >= self.max_pages {
                tracing::warn!(
                    provider = "zettle",
                    location_id,
                    max_pages = self.max_pages,
                    "pagination cap reached — returning partial window"
                );
                pagination_capped = true;
                break;
            }

            let mut query = vec![
                ("locationUuid", location_id.to_owned()),
                ("startDate", start.to_rfc3339()),
                ("endDate", end.to_rfc3339()),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            if let Some(hash) = &cursor {
                query.push(("lastPurchaseHash", hash.clone()));
            }

            let body = self.http.get(&url, &query).await?;
            let page: ZettlePurchasesResponse = parse(body, "zettle purchases page")?;
            let page_empty = page.purchases.is_empty();

            for purchase in page.purchases {
                transactions.push(normalize_transaction_value(purchase)?);
            }

            pages += 1;
            match page.last_purchase_hash {
                Some(hash) if !page_empty => cursor = Some(hash),
                _ => break,
            }
        }

        Ok(SearchOutcome {
            transactions,
            pagination_capped,
        })
    }

    /// Fetches a single purchase by id.
    ///
    /// # Errors
    ///
    /// [`ProviderError::NotFound`] if the purchase does not exist;
    /// otherwise any [`ProviderError`] from the underlying request.
    pub async fn get_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<NormalizedTransaction, ProviderError> {
        let url = format!("{}/purchases/v2/{transaction_id}", self.base_url);
        let body = self.http.get(&url, &[]).await?;
        normalize_transaction_value(body)
    }

    /// Registers a webhook subscription.
    ///
    /// # Errors
    ///
    /// Propagates any [`ProviderError`] from the underlying request.
    pub async fn create_webhook(
        &self,
        destination: &str,
        event_names: &[&str],
    ) -> Result<WebhookSubscription, ProviderError> {
        let url = format!("{}/organizations/self/subscriptions", self.base_url);
        let body = serde_json::json!({
            "transportName": "WEBHOOK",
            "destination": destination,
            "eventNames": event_names,
        });
        let response = self.http.post(&url, body).await?;
        let raw: ZettleSubscription = parse(response, "zettle subscription")?;
        Ok(subscription_to_webhook(raw))
    }

    /// Lists registered webhook subscriptions.
    ///
    /// # Errors
    ///
    /// Propagates any [`ProviderError`] from the underlying request.
    pub async fn list_webhooks(&self) -> Result<Vec<WebhookSubscription>, ProviderError> {
        let url = format!("{}/organizations/self/subscriptions", self.base_url);
        let body = self.http.get(&url, &[]).await?;
        let raw: Vec<ZettleSubscription> = parse(body, "zettle subscriptions")?;
        Ok(raw.into_iter().map(subscription_to_webhook).collect())
    }

    /// Deletes a webhook subscription.
    ///
    /// # Errors
    ///
    /// Propagates any [`ProviderError`] from the underlying request.
    pub async fn delete_webhook(&self, subscription_id: &str) -> Result<(), ProviderError> {
        let url = format!(
            "{}/organizations/self/subscriptions/{subscription_id}",
            self.base_url
        );
        self.http.delete(&url).await
    }

    /// Verifies a webhook delivery signature in constant time.
    #[must_use]
    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        verify_signature(&self.webhook_secret, payload, signature)
    }
}

fn subscription_to_webhook(raw: ZettleSubscription) -> WebhookSubscription {
    WebhookSubscription {
        id: raw.uuid,
        url: raw.destination,
        event_types: raw.event_names,
        active: raw.status.as_deref() != Some("DISABLED"),
    }
}

fn parse<D: serde::de::DeserializeOwned>(body: Value, context: &str) -> Result<D, ProviderError> {
    serde_json::from_value(body).map_err(|e| ProviderError::Deserialize {
        context: context.to_owned(),
        source: e,
    })
}
