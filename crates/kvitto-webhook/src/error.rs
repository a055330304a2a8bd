use kvitto_core::ProviderId;
use thiserror::Error;

/// Errors from webhook delivery handling.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// No registry entry for the provider named in the delivery URL.
    #[error("no configured provider app for {0}")]
    UnknownProvider(ProviderId),

    /// Signature header missing, malformed, or not matching the payload.
    /// The body is never parsed when this is returned.
    #[error("invalid webhook signature for {provider}")]
    InvalidSignature { provider: ProviderId },

    /// Body passed signature verification but is not a well-formed event
    /// envelope.
    #[error("malformed webhook payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Envelope parsed but the transaction payload could not be
    /// normalized. The event is not marked processed; a redelivery gets
    /// another attempt.
    #[error("webhook event {event_id} could not be processed: {source}")]
    Processing {
        event_id: String,
        #[source]
        source: kvitto_provider::ProviderError,
    },
}
