//! Raw SumUp API payload shapes.
//!
//! SumUp reports amounts as decimal major units (`65.5` for 65.50 SEK).
//! The amount is kept as a raw JSON number here and converted to minor
//! units exactly once, in `normalize`.

use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SumUpTransaction {
    pub id: String,
    pub transaction_code: String,
    pub location_id: String,
    pub timestamp: DateTime<Utc>,
    /// Decimal major units; converted via `to_minor_units` during
    /// normalization and nowhere else.
    pub amount: serde_json::Number,
    pub currency: String,
    /// `SUCCESSFUL`, `REFUNDED`, or `PENDING`.
    pub status: String,
    pub payment_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SumUpHistoryPage {
    pub items: Vec<serde_json::Value>,
    #[serde(default)]
    pub links: Vec<SumUpLink>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SumUpLink {
    pub rel: String,
    pub href: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SumUpLocation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<SumUpAddress>,
    pub timezone: String,
    pub currency: String,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SumUpAddress {
    pub line_1: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SumUpReader {
    pub id: String,
    pub name: String,
    pub device_model: Option<String>,
    /// `paired`, `offline`, or `retired`.
    pub status: String,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SumUpWebhook {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub event_types: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}
