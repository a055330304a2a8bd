//! SumUp adapter: transaction history, locations, readers, webhooks.

mod normalize;
mod pagination;
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

use types::{SumUpHistoryPage, SumUpLocation, SumUpReader, SumUpWebhook};

const PAGE_LIMIT: u32 = 100;

/// Adapter over the SumUp REST API.
pub struct SumUpAdapter<T: TokenSource> {
    http: ProviderHttp<T>,
    base_url: String,
    webhook_secret: String,
    max_pages: usize,
}

impl<T: TokenSource> SumUpAdapter<T> {
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
        let http = ProviderHttp::new(ProviderId::SumUp, tokens, settings)?;
        Ok(Self {
            http,
            base_url: app.api_base_url.trim_end_matches('/').to_owned(),
            webhook_secret: app.webhook_secret.clone(),
            max_pages,
        })
    }

    /// Cheap authenticated probe used by onboarding.
    ///
    /// # Errors
    ///
    /// Propagates any [`ProviderError`] from the underlying request.
    pub async fn test_connection(&self) -> Result<(), ProviderError> {
        let url = format!("{}/v0.1/me", self.base_url);
        self.http.get(&url, &[]).await?;
        Ok(())
    }

    /// Fetches all business locations.
    ///
    /// # Errors
    ///
    /// Propagates any [`ProviderError`] from the underlying request.
    pub async fn get_locations(&self) -> Result<Vec<NormalizedLocation>, ProviderError> {
        let url = format!("{}/v0.1/me/locations", self.base_url);
        let body = self.http.get(&url, &[]).await?;
        let raw: Vec<SumUpLocation> = parse(body, "sumup locations")?;
        Ok(raw.into_iter().map(normalize::normalize_location).collect())
    }

    /// Fetches the readers paired at one location.
    ///
    /// # Errors
    ///
    /// Propagates any [`ProviderError`] from the underlying request.
    pub async fn get_location_devices(
        &self,
        location_id: &str,
    ) -> Result<Vec<NormalizedDevice>, ProviderError> {
        let url = format!("{}/v0.1/me/locations/{location_id}/readers", self.base_url);
        let body = self.http.get(&url, &[]).await?;
        let raw: Vec<SumUpReader> = parse(body, "sumup readers")?;
        Ok(raw
            .into_iter()
            .map(|r| normalize::normalize_device(r, location_id))
            .collect())
    }

    /// Fetches all transactions for a location in `[start, end]`, chasing
    /// the `next` link in each page body until exhausted or the page cap.
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
        let endpoint = format!("{}/v0.1/me/transactions/history", self.base_url);
        let mut transactions = Vec::new();
        let mut pages = 0usize;
        let mut pagination_capped = false;

        let first_query = [
            ("location_id", location_id.to_owned()),
            ("oldest_time", start.to_rfc3339()),
            ("newest_time", end.to_rfc3339()),
            ("order", "ascending".to_owned()),
            ("limit", PAGE_LIMIT.to_string()),
        ];
        let mut next_url: Option<String> = None;

        loop {
            if pages >= self.max_pages {
                tracing::warn!(
                    provider = "sumup",
                    location_id,
                    max_pages = self.max_pages,
                    "pagination cap reached — returning partial window"
                );
                pagination_capped = true;
                break;
            }

            let body = match &next_url {
                None => self.http.get(&endpoint, &first_query).await?,
                Some(url) => self.http.get(url, &[]).await?,
            };
            let page: SumUpHistoryPage = parse(body, "sumup history page")?;

            for item in page.items {
                transactions.push(normalize_transaction_value(item)?);
            }

            pages += 1;
            match pagination::next_href(&page.links) {
                Some(href) => next_url = Some(pagination::resolve_next_url(&endpoint, href)),
                None => break,
            }
        }

        Ok(SearchOutcome {
            transactions,
            pagination_capped,
        })
    }

    /// Fetches a single transaction by id.
    ///
    /// # Errors
    ///
    /// [`ProviderError::NotFound`] if the transaction does not exist;
    /// otherwise any [`ProviderError`] from the underlying request.
    pub async fn get_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<NormalizedTransaction, ProviderError> {
        let url = format!("{}/v0.1/me/transactions/{transaction_id}", self.base_url);
        let body = self.http.get(&url, &[]).await?;
        normalize_transaction_value(body)
    }

    /// Registers a webhook.
    ///
    /// # Errors
    ///
    /// Propagates any [`ProviderError`] from the underlying request.
    pub async fn create_webhook(
        &self,
        destination: &str,
        event_types: &[&str],
    ) -> Result<WebhookSubscription, ProviderError> {
        let url = format!("{}/v0.1/me/webhooks", self.base_url);
        let body = serde_json::json!({
            "url": destination,
            "event_types": event_types,
        });
        let response = self.http.post(&url, body).await?;
        let raw: SumUpWebhook = parse(response, "sumup webhook")?;
        Ok(webhook_to_subscription(raw))
    }

    /// Lists registered webhooks.
    ///
    /// # Errors
    ///
    /// Propagates any [`ProviderError`] from the underlying request.
    pub async fn list_webhooks(&self) -> Result<Vec<WebhookSubscription>, ProviderError> {
        let url = format!("{}/v0.1/me/webhooks", self.base_url);
        let body = self.http.get(&url, &[]).await?;
        let raw: Vec<SumUpWebhook> = parse(body, "sumup webhooks")?;
        Ok(raw.into_iter().map(webhook_to_subscription).collect())
    }

    /// Deletes a webhook.
    ///
    /// # Errors
    ///
    /// Propagates any [`ProviderError`] from the underlying request.
    pub async fn delete_webhook(&self, webhook_id: &str) -> Result<(), ProviderError> {
        let url = format!("{}/v0.1/me/webhooks/{webhook_id}", self.base_url);
        self.http.delete(&url).await
    }

    /// Verifies a webhook delivery signature in constant time.
    #[must_use]
    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        verify_signature(&self.webhook_secret, payload, signature)
    }
}

fn webhook_to_subscription(raw: SumUpWebhook) -> WebhookSubscription {
    WebhookSubscription {
        id: raw.id,
        url: raw.url,
        event_types: raw.event_types,
        active: raw.enabled,
    }
}

fn parse<D: serde::de::DeserializeOwned>(body: Value, context: &str) -> Result<D, ProviderError> {
    serde_json::from_value(body).map_err(|e| ProviderError::Deserialize {
        context: context.to_owned(),
        source: e,
    })
}
