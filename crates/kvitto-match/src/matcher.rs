//! Purchase claim verification against provider transaction history.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use kvitto_core::{to_minor_units, MatchResult, NormalizedTransaction, TransactionStatus};
use kvitto_provider::{Provider, ProviderError, SearchOutcome, TokenSource};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::cache::{TransactionCache, WindowKey};
use crate::error::VerifyError;

/// Absolute floor for amount tolerance, in minor units (1.00 in a
/// two-decimal currency).
const MIN_AMOUNT_TOLERANCE_MINOR: i64 = 100;

/// Anything able to answer a windowed transaction search. Implemented by
/// the provider adapters; tests substitute a canned source.
pub trait TransactionSource: Send + Sync {
    fn search_transactions(
        &self,
        location_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<SearchOutcome, ProviderError>> + Send;
}

impl<T: TokenSource> TransactionSource for Provider<T> {
    async fn search_transactions(
        &self,
        location_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SearchOutcome, ProviderError> {
        Provider::search_transactions(self, location_id, start, end).await
    }
}

/// A purchase claim submitted for verification.
///
/// The claim carries no currency: amounts are interpreted in the claimed
/// location's settlement currency, which the caller resolves from the
/// directory.
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseClaim {
    pub location_id: String,
    /// Claimed amount in major units ("65.50").
    pub amount: Decimal,
    /// Claimed purchase time.
    pub timestamp: DateTime<Utc>,
    /// Per-claim override of the search window half-width. Falls back to
    /// the configured default when absent.
    pub tolerance_minutes: Option<i64>,
}

pub struct Matcher {
    cache: Arc<TransactionCache>,
    /// Default half-width of the search window around the claimed time,
    /// used when the claim does not override it.
    time_tolerance: Duration,
    /// Wall-clock budget for the upstream search on a cache miss.
    provider_deadline: std::time::Duration,
}

impl Matcher {
    #[must_use]
    pub fn new(
        cache: Arc<TransactionCache>,
        time_tolerance: Duration,
        provider_deadline: std::time::Duration,
    ) -> Self {
        Self {
            cache,
            time_tolerance,
            provider_deadline,
        }
    }

    /// Verifies a purchase claim against the provider's transactions.
    ///
    /// `currency` is the claimed location's settlement currency; the
    /// claimed amount is scaled with it and transactions in any other
    /// currency never match. Searches the window `claim.timestamp ±
    /// tolerance` (the claim's override or the configured default, cache
    /// first), then picks the completed transaction closest in amount,
    /// ties broken by time distance. Amount tolerance is 1% of the claim,
    /// rounded, with a 1.00 floor. A clean "nothing matched" is a
    /// successful verification with [`MatchResult::no_match`], never an
    /// error.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::Amount`] if the claimed amount cannot be scaled.
    /// - [`VerifyError::ProviderUnavailable`] on transient provider
    ///   failure or when the deadline elapses.
    /// - [`VerifyError::Provider`] on non-transient provider failure.
    pub async fn verify_purchase<S: TransactionSource>(
        &self,
        source: &S,
        claim: &PurchaseClaim,
        currency: &str,
        now: DateTime<Utc>,
    ) -> Result<MatchResult, VerifyError> {
        let claimed_minor = to_minor_units(claim.amount, currency)?;
        let half_width = claim
            .tolerance_minutes
            .map_or(self.time_tolerance, Duration::minutes);
        let key = WindowKey {
            location_id: claim.location_id.clone(),
            start: claim.timestamp - half_width,
            end: claim.timestamp + half_width,
        };

        let transactions = match self.cache.lookup(&key, now).await {
            Some(cached) => cached,
            None => {
                let outcome = self.fetch_window(source, &key).await?;
                if outcome.pagination_capped {
                    tracing::warn!(
                        location_id = %key.location_id,
                        "verification window truncated by pagination cap"
                    );
                }
                self.cache
                    .store(key.clone(), outcome.transactions.clone(), now)
                    .await;
                outcome.transactions
            }
        };

        Ok(best_match(&transactions, claim, currency, claimed_minor, &key))
    }

    async fn fetch_window<S: TransactionSource>(
        &self,
        source: &S,
        key: &WindowKey,
    ) -> Result<SearchOutcome, VerifyError> {
        let search = source.search_transactions(&key.location_id, key.start, key.end);
        match tokio::time::timeout(self.provider_deadline, search).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(VerifyError::ProviderUnavailable {
                reason: format!(
                    "transaction search exceeded {}s deadline",
                    self.provider_deadline.as_secs()
                ),
            }),
        }
    }
}

/// Picks the best candidate and scores it.
///
/// Confidence is `1 - amount_diff / claimed`, so an exact amount match
/// scores 1.0 and a match at the tolerance edge scores lowest.
fn best_match(
    transactions: &[NormalizedTransaction],
    claim: &PurchaseClaim,
    currency: &str,
    claimed_minor: i64,
    key: &WindowKey,
) -> MatchResult {
    // 1% of the claim, rounded half-up, never below the 1.00 floor.
    let amount_tolerance = MIN_AMOUNT_TOLERANCE_MINOR.max((claimed_minor + 50) / 100);

    let best = transactions
        .iter()
        .filter(|tx| tx.status == TransactionStatus::Completed)
        .filter(|tx| tx.currency.eq_ignore_ascii_case(currency))
        .filter(|tx| tx.timestamp >= key.start && tx.timestamp <= key.end)
        .map(|tx| {
            let amount_diff = (tx.amount_minor - claimed_minor).abs();
            let time_diff = (tx.timestamp - claim.timestamp).num_seconds().abs();
            (amount_diff, time_diff, tx)
        })
        .filter(|(amount_diff, _, _)| *amount_diff <= amount_tolerance)
        .min_by_key(|(amount_diff, time_diff, _)| (*amount_diff, *time_diff));

    match best {
        Some((amount_diff, _, tx)) => MatchResult {
            transaction: Some(tx.clone()),
            confidence: confidence(amount_diff, claimed_minor),
            within_tolerance: true,
        },
        None => MatchResult::no_match(),
    }
}

#[allow(clippy::cast_precision_loss)]
fn confidence(amount_diff: i64, claimed_minor: i64) -> f64 {
    if claimed_minor == 0 {
        return if amount_diff == 0 { 1.0 } else { 0.0 };
    }
    (1.0 - amount_diff as f64 / claimed_minor as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_one_for_exact_amount() {
        assert!((confidence(0, 6550) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn confidence_decreases_with_amount_distance() {
        let near = confidence(70, 6550);
        let far = confidence(100, 6550);
        assert!(near > far);
        assert!((near - (1.0 - 70.0 / 6550.0)).abs() < 1e-12);
    }

    #[test]
    fn zero_claim_edge() {
        assert!((confidence(0, 0) - 1.0).abs() < f64::EPSILON);
        assert!(confidence(50, 0).abs() < f64::EPSILON);
    }
}
