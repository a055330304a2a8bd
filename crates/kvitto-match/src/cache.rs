//! Short-TTL transaction cache.
//!
//! Two stores under one lock: window entries keyed by the exact search
//! window, and a per-location bucket of webhook-pushed transactions. The
//! freshness check and the read happen under the same lock acquisition,
//! so a sweep running concurrently can never hand out a stale entry.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use kvitto_core::{CacheEntry, NormalizedTransaction};
use serde::Serialize;
use tokio::sync::Mutex;

/// Cache key for one windowed search. Differing windows never share an
/// entry, even for the same location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub location_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Default)]
struct CacheState {
    windows: HashMap<WindowKey, CacheEntry<Vec<NormalizedTransaction>>>,
    /// Webhook-pushed transactions per location, newest data wins per id.
    pushed: HashMap<String, Vec<CacheEntry<NormalizedTransaction>>>,
    hits: u64,
    misses: u64,
}

/// Counters for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub window_entries: usize,
    pub pushed_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct TransactionCache {
    ttl: Duration,
    inner: Mutex<CacheState>,
}

impl TransactionCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(CacheState::default()),
        }
    }

    /// Looks up a cached window, merging in any fresh pushed transactions
    /// whose timestamp falls inside it. Returns `None` (a miss) when the
    /// window entry is absent or stale — pushed transactions alone never
    /// satisfy a window lookup, they only enrich a hit.
    pub async fn lookup(
        &self,
        key: &WindowKey,
        now: DateTime<Utc>,
    ) -> Option<Vec<NormalizedTransaction>> {
        let mut state = self.inner.lock().await;

        let fresh = state
            .windows
            .get(key)
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .map(|entry| entry.value.clone());

        let Some(mut transactions) = fresh else {
            state.misses += 1;
            return None;
        };
        state.hits += 1;

        if let Some(bucket) = state.pushed.get(&key.location_id) {
            for entry in bucket {
                if !entry.is_fresh(now, self.ttl) {
                    continue;
                }
                let tx = &entry.value;
                if tx.timestamp < key.start || tx.timestamp > key.end {
                    continue;
                }
                match transactions.iter_mut().find(|t| t.id == tx.id) {
                    // Pushed data is newer than the fetched window.
                    Some(existing) => *existing = tx.clone(),
                    None => transactions.push(tx.clone()),
                }
            }
        }

        Some(transactions)
    }

    /// Stores a freshly fetched window, replacing any previous entry.
    pub async fn store(
        &self,
        key: WindowKey,
        transactions: Vec<NormalizedTransaction>,
        now: DateTime<Utc>,
    ) {
        let mut state = self.inner.lock().await;
        state.windows.insert(key, CacheEntry::new(transactions, now));
    }

    /// Records a webhook-delivered transaction. An existing pushed entry
    /// with the same id is replaced (`transaction.updated` after
    /// `transaction.created`).
    pub async fn push(&self, transaction: NormalizedTransaction, now: DateTime<Utc>) {
        let mut state = self.inner.lock().await;
        let bucket = state
            .pushed
            .entry(transaction.location_id.clone())
            .or_default();
        if let Some(entry) = bucket.iter_mut().find(|e| e.value.id == transaction.id) {
            *entry = CacheEntry::new(transaction, now);
        } else {
            bucket.push(CacheEntry::new(transaction, now));
        }
    }

    /// Evicts every stale entry. Returns the number of entries removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.inner.lock().await;
        let before = state.windows.len()
            + state.pushed.values().map(Vec::len).sum::<usize>();

        let ttl = self.ttl;
        state.windows.retain(|_, entry| entry.is_fresh(now, ttl));
        for bucket in state.pushed.values_mut() {
            bucket.retain(|entry| entry.is_fresh(now, ttl));
        }
        state.pushed.retain(|_, bucket| !bucket.is_empty());

        let after = state.windows.len()
            + state.pushed.values().map(Vec::len).sum::<usize>();
        let evicted = before - after;
        if evicted > 0 {
            tracing::debug!(evicted, "transaction cache sweep");
        }
        evicted
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.inner.lock().await;
        CacheStats {
            window_entries: state.windows.len(),
            pushed_entries: state.pushed.values().map(Vec::len).sum(),
            hits: state.hits,
            misses: state.misses,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use kvitto_core::{ProviderId, TransactionStatus};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 14, 0, 0).unwrap()
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
            payment_method: None,
            raw_metadata: serde_json::Value::Null,
        }
    }

    fn key() -> WindowKey {
        WindowKey {
            location_id: "loc-1".to_owned(),
            start: t0(),
            end: t0() + Duration::minutes(4),
        }
    }

    #[tokio::test]
    async fn lookup_miss_then_hit() {
        let cache = TransactionCache::new(Duration::minutes(5));
        assert!(cache.lookup(&key(), t0()).await.is_none());

        cache
            .store(key(), vec![tx("tx-1", t0() + Duration::minutes(1), 6550)], t0())
            .await;
        let found = cache.lookup(&key(), t0() + Duration::seconds(30)).await;
        assert_eq!(found.map(|v| v.len()), Some(1));

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn entry_at_ttl_is_a_miss() {
        let cache = TransactionCache::new(Duration::minutes(5));
        cache.store(key(), vec![], t0()).await;

        assert!(cache
            .lookup(&key(), t0() + Duration::minutes(5) - Duration::seconds(1))
            .await
            .is_some());
        assert!(cache.lookup(&key(), t0() + Duration::minutes(5)).await.is_none());
    }

    #[tokio::test]
    async fn different_window_is_a_different_entry() {
        let cache = TransactionCache::new(Duration::minutes(5));
        cache.store(key(), vec![tx("tx-1", t0(), 100)], t0()).await;

        let shifted = WindowKey {
            start: t0() + Duration::seconds(1),
            ..key()
        };
        assert!(cache.lookup(&shifted, t0()).await.is_none());
    }

    #[tokio::test]
    async fn pushed_transactions_enrich_window_hits() {
        let cache = TransactionCache::new(Duration::minutes(5));
        cache
            .store(key(), vec![tx("tx-1", t0() + Duration::minutes(1), 6550)], t0())
            .await;
        cache.push(tx("tx-2", t0() + Duration::minutes(2), 1200), t0()).await;
        // Outside the window; must not appear.
        cache.push(tx("tx-3", t0() + Duration::minutes(10), 900), t0()).await;

        let found = cache
            .lookup(&key(), t0() + Duration::seconds(30))
            .await
            .expect("window is fresh");
        let ids: Vec<&str> = found.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["tx-1", "tx-2"]);
    }

    #[tokio::test]
    async fn pushed_update_replaces_fetched_copy() {
        let cache = TransactionCache::new(Duration::minutes(5));
        cache
            .store(key(), vec![tx("tx-1", t0() + Duration::minutes(1), 6550)], t0())
            .await;

        let mut updated = tx("tx-1", t0() + Duration::minutes(1), 6550);
        updated.status = TransactionStatus::Refunded;
        cache.push(updated, t0() + Duration::seconds(10)).await;

        let found = cache
            .lookup(&key(), t0() + Duration::seconds(30))
            .await
            .expect("window is fresh");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].status, TransactionStatus::Refunded);
    }

    #[tokio::test]
    async fn pushed_alone_never_satisfies_a_lookup() {
        let cache = TransactionCache::new(Duration::minutes(5));
        cache.push(tx("tx-1", t0() + Duration::minutes(1), 6550), t0()).await;
        assert!(cache.lookup(&key(), t0()).await.is_none());
    }

    #[tokio::test]
    async fn sweep_evicts_stale_entries_only() {
        let cache = TransactionCache::new(Duration::minutes(5));
        cache.store(key(), vec![], t0()).await;
        cache.push(tx("tx-1", t0(), 100), t0()).await;

        let late_key = WindowKey {
            location_id: "loc-2".to_owned(),
            start: t0(),
            end: t0() + Duration::minutes(4),
        };
        cache.store(late_key.clone(), vec![], t0() + Duration::minutes(4)).await;

        let evicted = cache.sweep(t0() + Duration::minutes(5)).await;
        assert_eq!(evicted, 2);
        assert!(cache.lookup(&late_key, t0() + Duration::minutes(5)).await.is_some());
    }
}
