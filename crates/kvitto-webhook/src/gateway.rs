//! Inbound webhook gateway.
//!
//! Order of operations is fixed: signature first, parse second, dedupe
//! third, process last. An unverified body is never parsed, and an event
//! id is claimed before processing starts. A concurrent duplicate waits
//! for the first delivery's outcome: only a completed delivery is
//! acknowledged as a duplicate, while a failed one hands the claim over
//! so the waiter retries the event itself.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use kvitto_core::{ProviderId, ProviderRegistry};
use kvitto_match::TransactionCache;
use kvitto_provider::{normalize_transaction_value, signature};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{Mutex, Notify};

use crate::error::WebhookError;

pub const EVENT_TRANSACTION_CREATED: &str = "transaction.created";
pub const EVENT_TRANSACTION_UPDATED: &str = "transaction.updated";

/// How a delivery was handled. All three are acknowledged with success to
/// the provider — only [`WebhookError`] maps to a failure response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Transaction event normalized and pushed into the cache.
    Processed,
    /// Event id seen before (or concurrently); nothing re-processed.
    Duplicate,
    /// Event type this service does not consume.
    Ignored,
}

/// Event envelope common to both providers' deliveries.
#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(alias = "eventId", alias = "id")]
    event_id: String,
    #[serde(alias = "eventName", alias = "event_type")]
    event_type: String,
    payload: Value,
}

enum SeenState {
    /// A delivery with this id is mid-processing; waiters park on the
    /// notify until it settles.
    InFlight(Arc<Notify>),
    /// Handled at this time; redeliveries are duplicates until swept.
    Done(DateTime<Utc>),
}

pub struct WebhookGateway {
    registry: Arc<ProviderRegistry>,
    cache: Arc<TransactionCache>,
    /// Event id claims, pruned by [`Self::sweep`].
    seen: Mutex<HashMap<String, SeenState>>,
    retention: Duration,
}

impl WebhookGateway {
    #[must_use]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        cache: Arc<TransactionCache>,
        retention: Duration,
    ) -> Self {
        Self {
            registry,
            cache,
            seen: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// Handles one raw delivery.
    ///
    /// # Errors
    ///
    /// - [`WebhookError::UnknownProvider`] when the provider has no
    ///   registry entry.
    /// - [`WebhookError::InvalidSignature`] when the signature does not
    ///   verify; the body is not parsed in that case.
    /// - [`WebhookError::Payload`] for a verified but malformed envelope.
    /// - [`WebhookError::Processing`] when normalization fails; the event
    ///   id is released so a redelivery (or a waiting concurrent
    ///   duplicate) can retry.
    pub async fn handle(
        &self,
        provider: ProviderId,
        payload: &[u8],
        signature_hex: &str,
        now: DateTime<Utc>,
    ) -> Result<Disposition, WebhookError> {
        let app = self
            .registry
            .get(provider)
            .ok_or(WebhookError::UnknownProvider(provider))?;

        if !signature::verify_signature(&app.webhook_secret, payload, signature_hex) {
            tracing::warn!(%provider, "webhook delivery with invalid signature rejected");
            return Err(WebhookError::InvalidSignature { provider });
        }

        let event: WebhookEvent = serde_json::from_slice(payload)?;

        // Claim the event id before processing. A racing duplicate parks
        // on the in-flight notify and re-checks once the first delivery
        // settles: completed means duplicate, failed means the claim is
        // free again and the waiter processes the event itself.
        loop {
            let mut seen = self.seen.lock().await;
            let in_flight = match seen.get(&event.event_id) {
                Some(SeenState::Done(_)) => {
                    tracing::debug!(%provider, event_id = %event.event_id, "duplicate webhook delivery");
                    return Ok(Disposition::Duplicate);
                }
                Some(SeenState::InFlight(notify)) => Arc::clone(notify),
                None => {
                    seen.insert(
                        event.event_id.clone(),
                        SeenState::InFlight(Arc::new(Notify::new())),
                    );
                    break;
                }
            };
            // Register interest before releasing the lock so a settle
            // between unlock and await cannot be missed.
            let settled = in_flight.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();
            drop(seen);
            settled.await;
        }

        match event.event_type.as_str() {
            EVENT_TRANSACTION_CREATED | EVENT_TRANSACTION_UPDATED => {
                match normalize_transaction_value(provider, event.payload) {
                    Ok(transaction) => {
                        tracing::debug!(
                            %provider,
                            event_id = %event.event_id,
                            transaction_id = %transaction.id,
                            "webhook transaction pushed to cache"
                        );
                        self.cache.push(transaction, now).await;
                        self.settle(&event.event_id, Some(now)).await;
                        Ok(Disposition::Processed)
                    }
                    Err(source) => {
                        self.settle(&event.event_id, None).await;
                        Err(WebhookError::Processing {
                            event_id: event.event_id,
                            source,
                        })
                    }
                }
            }
            other => {
                tracing::debug!(%provider, event_type = %other, "ignoring unconsumed webhook event");
                self.settle(&event.event_id, Some(now)).await;
                Ok(Disposition::Ignored)
            }
        }
    }

    /// Resolves an in-flight claim: mark it done at `done_at`, or release
    /// it entirely. Either way, parked duplicates are woken to re-check.
    async fn settle(&self, event_id: &str, done_at: Option<DateTime<Utc>>) {
        let mut seen = self.seen.lock().await;
        let previous = match done_at {
            Some(at) => seen.insert(event_id.to_owned(), SeenState::Done(at)),
            None => seen.remove(event_id),
        };
        drop(seen);
        if let Some(SeenState::InFlight(notify)) = previous {
            notify.notify_waiters();
        }
    }

    /// Drops settled event ids older than the retention window. In-flight
    /// claims are never pruned. Returns the number removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut seen = self.seen.lock().await;
        let before = seen.len();
        let retention = self.retention;
        seen.retain(|_, state| match state {
            SeenState::InFlight(_) => true,
            SeenState::Done(at) => now - *at < retention,
        });
        before - seen.len()
    }
}
