//! Raw Zettle API payload shapes.
//!
//! Zettle reports purchase amounts already in the currency's minor unit
//! (öre for SEK), so normalization passes them through untouched.

use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZettlePurchase {
    #[serde(rename = "purchaseUUID")]
    pub purchase_uuid: String,
    pub location_uuid: String,
    pub timestamp: DateTime<Utc>,
    /// Already in minor units.
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub refunded: bool,
    #[serde(default)]
    pub payments: Vec<ZettlePayment>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZettlePayment {
    #[serde(rename = "type")]
    pub payment_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZettlePurchasesResponse {
    pub purchases: Vec<serde_json::Value>,
    /// Cursor for the next page; absent on the last page.
    pub last_purchase_hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZettleLocation {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<ZettleAddress>,
    pub time_zone: String,
    pub currency: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZettleAddress {
    pub address_line1: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZettleDevice {
    pub uuid: String,
    pub name: String,
    pub model: Option<String>,
    pub location_uuid: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub deactivated: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZettleSubscription {
    pub uuid: String,
    pub destination: String,
    #[serde(default)]
    pub event_names: Vec<String>,
    pub status: Option<String>,
}

fn default_true() -> bool {
    true
}
