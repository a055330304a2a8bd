//! End-to-end verification scenarios against a canned transaction source.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use kvitto_core::{NormalizedTransaction, ProviderId, TransactionStatus};
use kvitto_match::{Matcher, PurchaseClaim, TransactionCache, TransactionSource, VerifyError};
use kvitto_provider::{ProviderError, SearchOutcome};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

struct FakeSource {
    transactions: Vec<NormalizedTransaction>,
    calls: AtomicUsize,
    delay: Option<std::time::Duration>,
    fail_status: Option<u16>,
}

impl FakeSource {
    fn with(transactions: Vec<NormalizedTransaction>) -> Self {
        Self {
            transactions,
            calls: AtomicUsize::new(0),
            delay: None,
            fail_status: None,
        }
    }

    fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            ..Self::with(Vec::new())
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TransactionSource for FakeSource {
    async fn search_transactions(
        &self,
        _location_id: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<SearchOutcome, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(status) = self.fail_status {
            return Err(ProviderError::UnexpectedStatus {
                status,
                url: "https://pos.example/transactions".to_owned(),
            });
        }
        Ok(SearchOutcome {
            transactions: self.transactions.clone(),
            pagination_capped: false,
        })
    }
}

fn purchase_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 14, 30, 0).unwrap()
}

fn tx(id: &str, timestamp: DateTime<Utc>, amount_minor: i64) -> NormalizedTransaction {
    NormalizedTransaction {
        id: id.to_owned(),
        provider: ProviderId::Zettle,
        location_id: "loc-1".to_owned(),
        amount_minor,
        currency: "SEK".to_owned(),
        timestamp,
        status: TransactionStatus::Completed,
        payment_method: Some("card".to_owned()),
        raw_metadata: serde_json::Value::Null,
    }
}

fn claim(amount: Decimal, timestamp: DateTime<Utc>) -> PurchaseClaim {
    PurchaseClaim {
        location_id: "loc-1".to_owned(),
        amount,
        timestamp,
        tolerance_minutes: None,
    }
}

fn matcher() -> Matcher {
    Matcher::new(
        Arc::new(TransactionCache::new(Duration::minutes(5))),
        Duration::minutes(2),
        std::time::Duration::from_secs(10),
    )
}

#[tokio::test]
async fn claim_near_the_purchase_matches_with_full_confidence() {
    let source = FakeSource::with(vec![tx("tx-1", purchase_time(), 6550)]);
    // Customer claims 65.50 SEK ninety seconds after the receipt time.
    let result = matcher()
        .verify_purchase(
            &source,
            &claim(dec!(65.50), purchase_time() + Duration::seconds(90)),
            "SEK",
            purchase_time() + Duration::seconds(90),
        )
        .await
        .expect("verification should run");

    assert!(result.within_tolerance);
    assert_eq!(result.transaction.as_ref().map(|t| t.id.as_str()), Some("tx-1"));
    assert!((result.confidence - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn claim_a_quarter_hour_late_finds_nothing() {
    let source = FakeSource::with(vec![tx("tx-1", purchase_time(), 6550)]);
    let late = Utc.with_ymd_and_hms(2025, 6, 1, 14, 45, 0).unwrap();
    let result = matcher()
        .verify_purchase(&source, &claim(dec!(65.50), late), "SEK", late)
        .await
        .expect("a clean no-match is not an error");

    assert!(!result.within_tolerance);
    assert!(result.transaction.is_none());
}

#[tokio::test]
async fn time_window_boundary_is_inclusive_at_the_tolerance() {
    let inside = FakeSource::with(vec![tx(
        "tx-in",
        purchase_time() + Duration::seconds(119),
        6550,
    )]);
    let result = matcher()
        .verify_purchase(&inside, &claim(dec!(65.50), purchase_time()), "SEK", purchase_time())
        .await
        .expect("should verify");
    assert!(result.within_tolerance);

    let outside = FakeSource::with(vec![tx(
        "tx-out",
        purchase_time() + Duration::seconds(121),
        6550,
    )]);
    let result = matcher()
        .verify_purchase(&outside, &claim(dec!(65.50), purchase_time()), "SEK", purchase_time())
        .await
        .expect("should verify");
    assert!(!result.within_tolerance);
}

#[tokio::test]
async fn claim_tolerance_override_widens_the_window() {
    // The purchase sits three minutes before the claim: outside the
    // two-minute default, inside an explicit five-minute window.
    let source = FakeSource::with(vec![tx("tx-1", purchase_time(), 6550)]);
    let m = matcher();
    let claimed_at = purchase_time() + Duration::minutes(3);

    let result = m
        .verify_purchase(&source, &claim(dec!(65.50), claimed_at), "SEK", claimed_at)
        .await
        .expect("should verify");
    assert!(!result.within_tolerance);

    let mut widened = claim(dec!(65.50), claimed_at);
    widened.tolerance_minutes = Some(5);
    let result = m
        .verify_purchase(&source, &widened, "SEK", claimed_at)
        .await
        .expect("should verify");
    assert!(result.within_tolerance);
    assert_eq!(result.transaction.as_ref().map(|t| t.id.as_str()), Some("tx-1"));
}

#[tokio::test]
async fn small_amount_discrepancy_matches_with_reduced_confidence() {
    // Receipt says 65.50; customer typed 66.20 — 70 öre off, inside the
    // 1.00 floor.
    let source = FakeSource::with(vec![tx("tx-1", purchase_time(), 6550)]);
    let result = matcher()
        .verify_purchase(&source, &claim(dec!(66.20), purchase_time()), "SEK", purchase_time())
        .await
        .expect("should verify");

    assert!(result.within_tolerance);
    assert!(result.confidence < 1.0);
    assert!((result.confidence - (1.0 - 70.0 / 6620.0)).abs() < 1e-9);
}

#[tokio::test]
async fn large_amount_discrepancy_is_no_match() {
    let source = FakeSource::with(vec![tx("tx-1", purchase_time(), 6550)]);
    let result = matcher()
        .verify_purchase(&source, &claim(dec!(70.00), purchase_time()), "SEK", purchase_time())
        .await
        .expect("should verify");

    assert!(!result.within_tolerance);
}

#[tokio::test]
async fn percent_tolerance_rounds_instead_of_truncating() {
    // 199.90 claimed → 1% is 199.9 öre; the tolerance is 200, not 199.
    let edge = FakeSource::with(vec![tx("tx-edge", purchase_time(), 19790)]);
    let result = matcher()
        .verify_purchase(&edge, &claim(dec!(199.90), purchase_time()), "SEK", purchase_time())
        .await
        .expect("should verify");
    assert!(result.within_tolerance, "a 200-öre difference sits exactly on the tolerance");

    let past = FakeSource::with(vec![tx("tx-past", purchase_time(), 19789)]);
    let result = matcher()
        .verify_purchase(&past, &claim(dec!(199.90), purchase_time()), "SEK", purchase_time())
        .await
        .expect("should verify");
    assert!(!result.within_tolerance);
}

#[tokio::test]
async fn transactions_in_another_currency_never_match() {
    let mut foreign = tx("tx-eur", purchase_time(), 6550);
    foreign.currency = "EUR".to_owned();
    let source = FakeSource::with(vec![foreign]);

    let result = matcher()
        .verify_purchase(&source, &claim(dec!(65.50), purchase_time()), "SEK", purchase_time())
        .await
        .expect("should verify");
    assert!(!result.within_tolerance);
}

#[tokio::test]
async fn refunded_and_pending_transactions_never_match() {
    let mut refunded = tx("tx-ref", purchase_time(), 6550);
    refunded.status = TransactionStatus::Refunded;
    let mut pending = tx("tx-pend", purchase_time(), 6550);
    pending.status = TransactionStatus::Pending;

    let source = FakeSource::with(vec![refunded, pending]);
    let result = matcher()
        .verify_purchase(&source, &claim(dec!(65.50), purchase_time()), "SEK", purchase_time())
        .await
        .expect("should verify");

    assert!(!result.within_tolerance);
}

#[tokio::test]
async fn closest_amount_wins_with_time_as_tiebreaker() {
    let source = FakeSource::with(vec![
        tx("tx-far-amount", purchase_time(), 6600),
        tx("tx-late", purchase_time() + Duration::seconds(60), 6550),
        tx("tx-near", purchase_time() + Duration::seconds(10), 6550),
    ]);
    let result = matcher()
        .verify_purchase(&source, &claim(dec!(65.50), purchase_time()), "SEK", purchase_time())
        .await
        .expect("should verify");

    assert_eq!(result.transaction.as_ref().map(|t| t.id.as_str()), Some("tx-near"));
}

#[tokio::test]
async fn repeated_claims_reuse_the_cached_window() {
    let source = FakeSource::with(vec![tx("tx-1", purchase_time(), 6550)]);
    let m = matcher();
    let c = claim(dec!(65.50), purchase_time());

    m.verify_purchase(&source, &c, "SEK", purchase_time()).await.expect("first");
    m.verify_purchase(&source, &c, "SEK", purchase_time() + Duration::minutes(4))
        .await
        .expect("second");
    assert_eq!(source.calls(), 1, "second claim within TTL must be served from cache");

    m.verify_purchase(&source, &c, "SEK", purchase_time() + Duration::minutes(5) + Duration::seconds(1))
        .await
        .expect("third");
    assert_eq!(source.calls(), 2, "expired window must be re-fetched");
}

#[tokio::test(start_paused = true)]
async fn slow_provider_hits_the_deadline() {
    let mut source = FakeSource::with(vec![tx("tx-1", purchase_time(), 6550)]);
    source.delay = Some(std::time::Duration::from_secs(30));

    let result = matcher()
        .verify_purchase(&source, &claim(dec!(65.50), purchase_time()), "SEK", purchase_time())
        .await;
    assert!(matches!(result, Err(VerifyError::ProviderUnavailable { .. })));
}

#[tokio::test]
async fn transient_provider_failure_reports_unavailable() {
    let source = FakeSource::failing(503);
    let result = matcher()
        .verify_purchase(&source, &claim(dec!(65.50), purchase_time()), "SEK", purchase_time())
        .await;
    assert!(matches!(result, Err(VerifyError::ProviderUnavailable { .. })));
}

#[tokio::test]
async fn permanent_provider_failure_is_a_hard_error() {
    let source = FakeSource::failing(403);
    let result = matcher()
        .verify_purchase(&source, &claim(dec!(65.50), purchase_time()), "SEK", purchase_time())
        .await;
    assert!(matches!(result, Err(VerifyError::Provider(_))));
}
