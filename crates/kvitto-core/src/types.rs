//! Normalized data model shared by every component.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Supported POS providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Zettle,
    SumUp,
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderId::Zettle => write!(f, "zettle"),
            ProviderId::SumUp => write!(f, "sumup"),
        }
    }
}

impl std::str::FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zettle" => Ok(ProviderId::Zettle),
            "sumup" => Ok(ProviderId::SumUp),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Postal address attached to a provider location. All fields optional —
/// providers frequently omit parts of the address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub line1: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
}

impl Address {
    /// True when no field carries data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.line1.is_none() && self.city.is_none() && self.postal_code.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationStatus {
    Active,
    Inactive,
}

/// A provider business location, normalized at the adapter boundary.
///
/// `device_ids` is a derived index maintained by the directory — devices
/// reference their location via [`NormalizedDevice::location_id`], never the
/// other way round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedLocation {
    /// Provider-scoped location identifier.
    pub id: String,
    pub provider: ProviderId,
    pub name: String,
    pub address: Option<Address>,
    /// IANA timezone name, e.g. `Europe/Stockholm`.
    pub timezone: String,
    /// ISO 4217 currency code, e.g. `SEK`.
    pub currency: String,
    pub status: LocationStatus,
    pub capabilities: BTreeSet<String>,
    pub device_ids: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    Inactive,
}

/// A POS terminal/register belonging to a location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedDevice {
    pub id: String,
    pub name: String,
    pub model: Option<String>,
    /// One-way foreign key to the owning location.
    pub location_id: String,
    pub status: DeviceStatus,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
    Refunded,
    Pending,
}

/// A purchase transaction, normalized at the adapter boundary.
///
/// Immutable once created. `provider` doubles as the normalization tag:
/// payloads that already carry it deserialize directly instead of being
/// normalized a second time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedTransaction {
    pub id: String,
    pub provider: ProviderId,
    pub location_id: String,
    /// Amount in the currency's smallest unit (öre, cents). Amount
    /// comparison happens only in minor units.
    pub amount_minor: i64,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
    pub status: TransactionStatus,
    pub payment_method: Option<String>,
    /// Provider payload kept for audit/debugging; never interpreted
    /// downstream.
    pub raw_metadata: serde_json::Value,
}

/// Confidence bucket for a provider→internal location mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    High,
    Medium,
    Low,
    /// 1:1 identity mapping used when no internal location list exists.
    Direct,
}

/// A computed mapping from a provider location onto an internal business
/// location. Recomputed on every sync — never persisted as ground truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationMapping {
    pub provider_location_id: String,
    pub internal_location_id: String,
    /// Combined name/address score in `[0, 1]`.
    pub confidence: f64,
    pub match_type: MatchType,
}

/// Verdict returned to the reward pipeline.
///
/// `transaction: None` with `within_tolerance: false` means "verified no
/// match". Verification failures are errors, never a `MatchResult` — the
/// caller must be able to tell "no purchase happened" from "we could not
/// check".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub transaction: Option<NormalizedTransaction>,
    pub confidence: f64,
    pub within_tolerance: bool,
}

impl MatchResult {
    /// The "verified no match" verdict.
    #[must_use]
    pub fn no_match() -> Self {
        Self {
            transaction: None,
            confidence: 0.0,
            within_tolerance: false,
        }
    }
}

/// A cached value with its fetch timestamp.
///
/// Freshness is re-checked on every read; a stale entry is treated as
/// absent regardless of whether the eviction sweep has removed it yet.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, fetched_at: DateTime<Utc>) -> Self {
        Self { value, fetched_at }
    }

    /// True while `now - fetched_at` is strictly inside the TTL.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.fetched_at < ttl
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn provider_id_round_trips_through_str() {
        for p in [ProviderId::Zettle, ProviderId::SumUp] {
            let parsed: ProviderId = p.to_string().parse().expect("should parse");
            assert_eq!(parsed, p);
        }
    }

    #[test]
    fn provider_id_parse_rejects_unknown() {
        assert!("clover".parse::<ProviderId>().is_err());
    }

    #[test]
    fn cache_entry_fresh_within_ttl() {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let entry = CacheEntry::new(42, t0);
        assert!(entry.is_fresh(t0 + Duration::seconds(299), Duration::seconds(300)));
    }

    #[test]
    fn cache_entry_stale_at_exact_ttl() {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let entry = CacheEntry::new(42, t0);
        assert!(!entry.is_fresh(t0 + Duration::seconds(300), Duration::seconds(300)));
    }

    #[test]
    fn empty_address_reports_empty() {
        assert!(Address::default().is_empty());
        let addr = Address {
            city: Some("Stockholm".to_owned()),
            ..Address::default()
        };
        assert!(!addr.is_empty());
    }
}
