//! Normalization from raw SumUp payloads to the canonical types.
//!
//! This is the single place where SumUp's decimal major-unit amounts are
//! converted to integer minor units. Running an amount through here twice
//! would scale it 100×, which is why `normalize_transaction_value` checks
//! the canonical provider tag before converting.

use std::str::FromStr;

use kvitto_core::{
    to_minor_units, Address, DeviceStatus, LocationStatus, NormalizedDevice, NormalizedLocation,
    NormalizedTransaction, ProviderId, TransactionStatus,
};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::ProviderError;
use crate::sumup::types::{SumUpLocation, SumUpReader, SumUpTransaction};

/// Normalizes a raw SumUp transaction payload into a
/// [`NormalizedTransaction`].
///
/// Idempotent: a value already carrying `"provider": "sumup"` is
/// deserialized directly — its amount is already in minor units and must
/// not be converted again.
///
/// # Errors
///
/// - [`ProviderError::Deserialize`] if the payload matches neither shape.
/// - [`ProviderError::Normalization`] for unrepresentable amounts or an
///   unknown transaction status.
pub fn normalize_transaction_value(value: Value) -> Result<NormalizedTransaction, ProviderError> {
    if value.get("provider").and_then(Value::as_str) == Some("sumup") {
        return serde_json::from_value(value).map_err(|e| ProviderError::Deserialize {
            context: "canonical sumup transaction".to_owned(),
            source: e,
        });
    }

    let raw: SumUpTransaction =
        serde_json::from_value(value.clone()).map_err(|e| ProviderError::Deserialize {
            context: "sumup transaction".to_owned(),
            source: e,
        })?;

    // Through Decimal, not f64: the JSON number's decimal digits are kept
    // exact until the single rounding step inside to_minor_units.
    let amount =
        Decimal::from_str(&raw.amount.to_string()).map_err(|e| ProviderError::Normalization {
            provider: "sumup".to_owned(),
            object_id: raw.id.clone(),
            reason: format!("unparseable amount {}: {e}", raw.amount),
        })?;
    let amount_minor =
        to_minor_units(amount, &raw.currency).map_err(|e| ProviderError::Normalization {
            provider: "sumup".to_owned(),
            object_id: raw.id.clone(),
            reason: e.to_string(),
        })?;

    let status = match raw.status.as_str() {
        "SUCCESSFUL" => TransactionStatus::Completed,
        "REFUNDED" => TransactionStatus::Refunded,
        "PENDING" => TransactionStatus::Pending,
        other => {
            return Err(ProviderError::Normalization {
                provider: "sumup".to_owned(),
                object_id: raw.id,
                reason: format!("unknown transaction status: {other}"),
            })
        }
    };

    Ok(NormalizedTransaction {
        id: raw.id,
        provider: ProviderId::SumUp,
        location_id: raw.location_id,
        amount_minor,
        currency: raw.currency,
        timestamp: raw.timestamp,
        status,
        payment_method: raw.payment_type.map(|p| p.to_lowercase()),
        raw_metadata: value,
    })
}

pub(super) fn normalize_location(raw: SumUpLocation) -> NormalizedLocation {
    let address = raw.address.map(|a| Address {
        line1: a.line_1,
        city: a.city,
        postal_code: a.postal_code,
    });

    NormalizedLocation {
        id: raw.id,
        provider: ProviderId::SumUp,
        name: raw.name,
        address: address.filter(|a| !a.is_empty()),
        timezone: raw.timezone,
        currency: raw.currency,
        status: match raw.status.as_deref() {
            Some("inactive") => LocationStatus::Inactive,
            _ => LocationStatus::Active,
        },
        capabilities: std::collections::BTreeSet::new(),
        device_ids: std::collections::BTreeSet::new(),
    }
}

pub(super) fn normalize_device(raw: SumUpReader, location_id: &str) -> NormalizedDevice {
    let status = match raw.status.as_str() {
        "paired" => DeviceStatus::Online,
        "retired" => DeviceStatus::Inactive,
        _ => DeviceStatus::Offline,
    };

    NormalizedDevice {
        id: raw.id,
        name: raw.name,
        model: raw.device_model,
        location_id: location_id.to_owned(),
        status,
        last_seen_at: raw.last_seen_at,
    }
}
