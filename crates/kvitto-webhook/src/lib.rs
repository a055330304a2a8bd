//! Webhook ingestion: signature-gated, idempotent processing of provider
//! transaction events into the reconciliation cache.

mod error;
mod gateway;

pub use error::WebhookError;
pub use gateway::{
    Disposition, WebhookGateway, EVENT_TRANSACTION_CREATED, EVENT_TRANSACTION_UPDATED,
};
