//! Fuzzy mapping of provider locations onto internal business locations.
//!
//! Mappings are recomputed on every directory sync and never persisted as
//! ground truth; a corrected name or address on either side takes effect on
//! the next sync.

use kvitto_core::{Address, LocationMapping, MatchType, NormalizedLocation};
use serde::{Deserialize, Serialize};

use crate::similarity::{address_similarity, name_similarity};

const NAME_WEIGHT: f64 = 0.6;
const ADDRESS_WEIGHT: f64 = 0.4;
const ACCEPT_THRESHOLD: f64 = 0.5;

/// A business location from the operator's own records, the target side of
/// the mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalLocation {
    pub id: String,
    pub name: String,
    pub address: Option<Address>,
}

/// Result of one mapping pass.
#[derive(Debug, Clone, Default)]
pub struct MappingOutcome {
    pub mappings: Vec<LocationMapping>,
    /// Provider location ids with no candidate above the acceptance
    /// threshold. Surfaced for operator review, never silently dropped.
    pub unmapped: Vec<String>,
}

/// Maps each provider location onto its best internal candidate.
///
/// With an empty internal list every provider location maps onto itself
/// ([`MatchType::Direct`], confidence 1.0) — single-provider deployments
/// have no separate internal directory. Otherwise each provider location
/// gets the highest-scoring candidate (60% name, 40% address) if that score
/// clears 0.5, and lands in `unmapped` if none does.
#[must_use]
pub fn map_locations(
    provider_locations: &[NormalizedLocation],
    internal: &[InternalLocation],
) -> MappingOutcome {
    if internal.is_empty() {
        let mappings = provider_locations
            .iter()
            .map(|loc| LocationMapping {
                provider_location_id: loc.id.clone(),
                internal_location_id: loc.id.clone(),
                confidence: 1.0,
                match_type: MatchType::Direct,
            })
            .collect();
        return MappingOutcome {
            mappings,
            unmapped: Vec::new(),
        };
    }

    let mut outcome = MappingOutcome::default();
    for loc in provider_locations {
        match best_candidate(loc, internal) {
            Some(mapping) => outcome.mappings.push(mapping),
            None => {
                tracing::debug!(provider_location = %loc.id, "no mapping candidate above threshold");
                outcome.unmapped.push(loc.id.clone());
            }
        }
    }
    outcome
}

fn best_candidate(
    loc: &NormalizedLocation,
    internal: &[InternalLocation],
) -> Option<LocationMapping> {
    let mut best: Option<LocationMapping> = None;

    for candidate in internal {
        let name_score = name_similarity(&loc.name, &candidate.name);
        let addr_score = match (&loc.address, &candidate.address) {
            (Some(a), Some(b)) => address_similarity(a, b),
            _ => 0.0,
        };
        let combined = NAME_WEIGHT * name_score + ADDRESS_WEIGHT * addr_score;
        if combined <= ACCEPT_THRESHOLD {
            continue;
        }
        if best.as_ref().is_none_or(|m| combined > m.confidence) {
            best = Some(LocationMapping {
                provider_location_id: loc.id.clone(),
                internal_location_id: candidate.id.clone(),
                confidence: combined,
                match_type: classify(name_score, addr_score),
            });
        }
    }

    best
}

fn classify(name_score: f64, addr_score: f64) -> MatchType {
    if name_score >= 0.95 && addr_score >= 0.95 {
        MatchType::Exact
    } else if name_score >= 0.8 || addr_score >= 0.8 {
        MatchType::High
    } else if name_score >= 0.6 || addr_score >= 0.6 {
        MatchType::Medium
    } else {
        MatchType::Low
    }
}
