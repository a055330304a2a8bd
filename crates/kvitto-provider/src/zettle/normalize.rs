//! Normalization from raw Zettle payloads to the canonical types.
//!
//! The only amount handling here is a pass-through: Zettle amounts are
//! already integer minor units. All currency conversion for this adapter
//! happens in this module or not at all — callers never scale amounts.

use kvitto_core::{
    Address, DeviceStatus, LocationStatus, NormalizedDevice, NormalizedLocation,
    NormalizedTransaction, ProviderId, TransactionStatus,
};
use serde_json::Value;

use crate::error::ProviderError;
use crate::zettle::types::{ZettleDevice, ZettleLocation, ZettlePurchase};

/// Normalizes a raw Zettle purchase payload into a [`NormalizedTransaction`].
///
/// Idempotent: a value that already carries the canonical `"provider":
/// "zettle"` tag is deserialized directly instead of being normalized
/// again, so `normalize(normalize(x)) == normalize(x)`.
///
/// # Errors
///
/// Returns [`ProviderError::Deserialize`] if the payload matches neither
/// the canonical shape nor Zettle's purchase shape.
pub fn normalize_transaction_value(value: Value) -> Result<NormalizedTransaction, ProviderError> {
    if value.get("provider").and_then(Value::as_str) == Some("zettle") {
        return serde_json::from_value(value).map_err(|e| ProviderError::Deserialize {
            context: "canonical zettle transaction".to_owned(),
            source: e,
        });
    }

    let raw: ZettlePurchase =
        serde_json::from_value(value.clone()).map_err(|e| ProviderError::Deserialize {
            context: "zettle purchase".to_owned(),
            source: e,
        })?;

    Ok(NormalizedTransaction {
        id: raw.purchase_uuid,
        provider: ProviderId::Zettle,
        location_id: raw.location_uuid,
        amount_minor: raw.amount,
        currency: raw.currency,
        timestamp: raw.timestamp,
        status: if raw.refunded {
            TransactionStatus::Refunded
        } else {
            TransactionStatus::Completed
        },
        payment_method: raw
            .payments
            .first()
            .map(|p| p.payment_type.to_lowercase()),
        raw_metadata: value,
    })
}

pub(super) fn normalize_location(raw: ZettleLocation) -> NormalizedLocation {
    let address = raw.address.map(|a| Address {
        line1: a.address_line1,
        city: a.city,
        postal_code: a.postal_code,
    });

    NormalizedLocation {
        id: raw.uuid,
        provider: ProviderId::Zettle,
        name: raw.name,
        address: address.filter(|a| !a.is_empty()),
        timezone: raw.time_zone,
        currency: raw.currency,
        status: if raw.active {
            LocationStatus::Active
        } else {
            LocationStatus::Inactive
        },
        capabilities: raw.capabilities.into_iter().collect(),
        device_ids: std::collections::BTreeSet::new(),
    }
}

pub(super) fn normalize_device(raw: ZettleDevice) -> NormalizedDevice {
    let status = if raw.deactivated {
        DeviceStatus::Inactive
    } else if raw.online {
        DeviceStatus::Online
    } else {
        DeviceStatus::Offline
    };

    NormalizedDevice {
        id: raw.uuid,
        name: raw.name,
        model: raw.model,
        location_id: raw.location_uuid,
        status,
        last_seen_at: raw.last_seen,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_purchase() -> Value {
        serde_json::json!({
            "purchaseUUID": "p-123",
            "locationUuid": "loc-1",
            "timestamp": "2025-06-01T14:30:00Z",
            "amount": 6550,
            "currency": "SEK",
            "refunded": false,
            "payments": [{ "type": "CARD" }]
        })
    }

    #[test]
    fn normalizes_raw_purchase() {
        let tx = normalize_transaction_value(raw_purchase()).expect("should normalize");
        assert_eq!(tx.id, "p-123");
        assert_eq!(tx.provider, ProviderId::Zettle);
        assert_eq!(tx.location_id, "loc-1");
        assert_eq!(tx.amount_minor, 6550, "minor units pass through unscaled");
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.payment_method.as_deref(), Some("card"));
    }

    #[test]
    fn refunded_purchase_maps_to_refunded() {
        let mut value = raw_purchase();
        value["refunded"] = Value::Bool(true);
        let tx = normalize_transaction_value(value).expect("should normalize");
        assert_eq!(tx.status, TransactionStatus::Refunded);
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize_transaction_value(raw_purchase()).expect("first pass");
        let reserialized = serde_json::to_value(&once).expect("canonical serializes");
        let twice = normalize_transaction_value(reserialized).expect("second pass");
        assert_eq!(
            serde_json::to_value(&once).unwrap(),
            serde_json::to_value(&twice).unwrap()
        );
    }

    #[test]
    fn garbage_payload_is_a_deserialize_error() {
        let result = normalize_transaction_value(serde_json::json!({ "hello": "world" }));
        assert!(matches!(result, Err(ProviderError::Deserialize { .. })));
    }

    #[test]
    fn inactive_deactivated_device_wins_over_online() {
        let raw: ZettleDevice = serde_json::from_value(serde_json::json!({
            "uuid": "d-1",
            "name": "Front desk",
            "model": "Reader 2",
            "locationUuid": "loc-1",
            "online": true,
            "deactivated": true,
            "lastSeen": "2025-06-01T14:00:00Z"
        }))
        .unwrap();
        assert_eq!(normalize_device(raw).status, DeviceStatus::Inactive);
    }
}
