//! Exponential backoff ladder for transient provider errors.
//!
//! [`retry_with_backoff`] wraps a fallible async operation and retries on
//! transient failures: network-level errors and the retryable status
//! family (408, 500, 502, 503, 504). Rate limiting (429) is deliberately
//! NOT part of the ladder — it gets exactly one retry after the
//! provider-requested wait, handled by the HTTP client, so the two delays
//! never compound. Authorization failures, other 4xx, and malformed
//! responses are returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::ProviderError;

/// Returns `true` for errors the backoff ladder should retry.
///
/// **Retried by the ladder:**
/// - Network-level failures: timeout, connection reset.
/// - HTTP 408 and 5xx (500/502/503/504): transient upstream conditions.
///
/// **Not retried here:**
/// - [`ProviderError::RateLimited`] — single retry after the requested
///   wait, outside the ladder.
/// - [`ProviderError::Unauthorized`] — refresh-then-retry-once is its own
///   path; looping would hammer the token endpoint.
/// - Remaining 4xx, deserialize, normalization, auth errors — retrying
///   cannot fix them.
pub(crate) fn is_retriable(err: &ProviderError) -> bool {
    match err {
        ProviderError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        ProviderError::UnexpectedStatus { status, .. } => {
            matches!(status, 408 | 500 | 502 | 503 | 504)
        }
        _ => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on
/// transient errors.
///
/// Backoff schedule with `backoff_base_secs = 1` and `max_retries = 4`:
/// 1s, 2s, 4s, 8s before retries 1–4 (5 attempts total), each delay with
/// ±25% jitter and capped at 60s.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_secs: u64,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    const MAX_DELAY_SECS: u64 = 60;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                let computed = backoff_base_secs.saturating_mul(1u64 << attempt.min(10));
                let capped = computed.min(MAX_DELAY_SECS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms =
                    ((capped * 1000) as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                attempt += 1;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient provider error — retrying after backoff"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    fn server_error(status: u16) -> ProviderError {
        ProviderError::UnexpectedStatus {
            status,
            url: "https://pos.example/test".to_owned(),
        }
    }

    #[test]
    fn retryable_status_family() {
        for status in [408u16, 500, 502, 503, 504] {
            assert!(is_retriable(&server_error(status)), "{status} should retry");
        }
    }

    #[test]
    fn client_errors_are_not_retriable() {
        for status in [400u16, 403, 404, 422] {
            assert!(!is_retriable(&server_error(status)), "{status} must not retry");
        }
    }

    #[test]
    fn rate_limited_is_not_ladder_retriable() {
        assert!(!is_retriable(&ProviderError::RateLimited {
            provider: "zettle".to_owned(),
            retry_after_secs: 5,
        }));
    }

    #[test]
    fn unauthorized_is_not_ladder_retriable() {
        assert!(!is_retriable(&ProviderError::Unauthorized {
            provider: "sumup".to_owned(),
        }));
    }

    #[test]
    fn deserialize_error_is_not_retriable() {
        let src = serde_json::from_str::<()>("nope").unwrap_err();
        assert!(!is_retriable(&ProviderError::Deserialize {
            context: "test".to_owned(),
            source: src,
        }));
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(4, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, ProviderError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_503_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(4, 0, || {
            let c = Arc::clone(&c);
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(server_error(503))
                } else {
                    Ok::<u32, ProviderError>(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_ladder_then_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(4, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, ProviderError>(server_error(502))
            }
        })
        .await;
        // 5 attempts total: initial + 4 retries.
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(matches!(
            result,
            Err(ProviderError::UnexpectedStatus { status: 502, .. })
        ));
    }

    #[tokio::test]
    async fn does_not_retry_404() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(4, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, ProviderError>(ProviderError::NotFound {
                    url: "https://pos.example/tx/unknown".to_owned(),
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ProviderError::NotFound { .. })));
    }

    #[tokio::test]
    async fn does_not_retry_rate_limited() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(4, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, ProviderError>(ProviderError::RateLimited {
                    provider: "zettle".to_owned(),
                    retry_after_secs: 1,
                })
            }
        })
        .await;
        assert_eq!(
            calls.load(Ordering::SeqCst),
            1,
            "429 must not enter the backoff ladder"
        );
        assert!(matches!(result, Err(ProviderError::RateLimited { .. })));
    }
}
