//! Request-level middleware: correlation ids, API-key auth, and
//! per-caller rate limiting.
//!
//! Webhook deliveries never pass through the bearer-auth layer — they are
//! authenticated by their HMAC signature in the gateway instead.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use subtle::{Choice, ConstantTimeEq};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Correlation id for one request, taken from `x-request-id` or minted.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Bearer-key configuration for the protected routes.
///
/// Presented tokens are compared against every configured key in constant
/// time, so a probe learns nothing from response timing about how close a
/// guess came.
#[derive(Clone)]
pub struct AuthState {
    api_keys: Arc<Vec<String>>,
    pub enabled: bool,
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("api_keys", &format_args!("[{} redacted]", self.api_keys.len()))
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl AuthState {
    /// Reads `KVITTO_API_KEYS` (comma-separated bearer keys).
    ///
    /// Development tolerates an empty key set and runs unauthenticated;
    /// every other environment refuses to start without keys.
    ///
    /// # Errors
    ///
    /// Fails when no keys are configured outside development.
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let raw = std::env::var("KVITTO_API_KEYS").unwrap_or_default();
        let keys: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        if keys.is_empty() {
            if is_development {
                tracing::warn!(
                    "KVITTO_API_KEYS empty; requests are unauthenticated in development"
                );
                return Ok(Self {
                    api_keys: Arc::new(Vec::new()),
                    enabled: false,
                });
            }
            anyhow::bail!(
                "KVITTO_API_KEYS must list at least one bearer key outside development"
            );
        }

        Ok(Self {
            api_keys: Arc::new(keys),
            enabled: true,
        })
    }

    fn allows(&self, token: &str) -> bool {
        let mut matched = Choice::from(0u8);
        for key in self.api_keys.iter() {
            matched |= key.as_bytes().ct_eq(token.as_bytes());
        }
        matched.into()
    }
}

#[derive(Debug)]
struct CallerWindow {
    started_at: Instant,
    count: usize,
}

/// Stale buckets are pruned once the map grows past this.
const MAX_TRACKED_CALLERS: usize = 1024;

/// Fixed-window rate limiter with one window per caller.
///
/// The caller key is the presented bearer key, so each merchant
/// integration spends its own budget; unauthenticated requests share one
/// bucket.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    buckets: Arc<Mutex<HashMap<String, CallerWindow>>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Counts one request against `caller`'s window. Returns `false` once
    /// the window is spent.
    async fn try_admit(&self, caller: &str) -> bool {
        let mut buckets = self.buckets.lock().await;

        if buckets.len() > MAX_TRACKED_CALLERS {
            let window = self.window;
            buckets.retain(|_, w| w.started_at.elapsed() < window);
        }

        let entry = buckets
            .entry(caller.to_owned())
            .or_insert_with(|| CallerWindow {
                started_at: Instant::now(),
                count: 0,
            });
        if entry.started_at.elapsed() >= self.window {
            entry.started_at = Instant::now();
            entry.count = 0;
        }
        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }
}

#[derive(Debug, Serialize)]
struct GateErrorBody {
    error: GateError,
}

#[derive(Debug, Serialize)]
struct GateError {
    code: &'static str,
    message: &'static str,
}

fn gate_response(status: StatusCode, code: &'static str, message: &'static str) -> Response {
    (
        status,
        Json(GateErrorBody {
            error: GateError { code, message },
        }),
    )
        .into_response()
}

/// Attaches a correlation id to the request and echoes it on the response.
///
/// A non-empty incoming `x-request-id` is reused as-is; otherwise a fresh
/// `UUIDv4` is minted. Handlers read it back through the [`RequestId`]
/// extension.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), ToOwned::to_owned);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", value);
    }
    res
}

/// Rejects requests that do not present a configured bearer key.
pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }

    match bearer_token(req.headers().get(AUTHORIZATION)) {
        Some(token) if auth.allows(token) => next.run(req).await,
        _ => gate_response(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid bearer token",
        ),
    }
}

/// Spends one unit of the caller's request budget before the handler runs.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let caller = bearer_token(req.headers().get(AUTHORIZATION))
        .unwrap_or("anonymous")
        .to_owned();

    if rate_limit.try_admit(&caller).await {
        next.run(req).await
    } else {
        gate_response(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "request budget exhausted for this key",
        )
    }
}

fn bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_with_keys(keys: &[&str]) -> AuthState {
        AuthState {
            api_keys: Arc::new(keys.iter().map(|k| (*k).to_owned()).collect()),
            enabled: true,
        }
    }

    #[test]
    fn bearer_token_strips_scheme_and_whitespace() {
        let header = HeaderValue::from_static("Bearer  kv_live_1 ");
        assert_eq!(bearer_token(Some(&header)), Some("kv_live_1"));
    }

    #[test]
    fn non_bearer_scheme_yields_no_token() {
        let header = HeaderValue::from_static("Basic abc123");
        assert_eq!(bearer_token(Some(&header)), None);
    }

    #[test]
    fn any_configured_key_is_accepted_and_near_misses_rejected() {
        let auth = auth_with_keys(&["kv_a", "kv_b"]);
        assert!(auth.allows("kv_a"));
        assert!(auth.allows("kv_b"));
        assert!(!auth.allows("kv_c"));
        assert!(!auth.allows("kv_"));
        assert!(!auth.allows(""));
    }

    #[test]
    fn debug_never_prints_key_material() {
        let auth = auth_with_keys(&["kv_secret_key"]);
        let printed = format!("{auth:?}");
        assert!(!printed.contains("kv_secret_key"));
        assert!(printed.contains("redacted"));
    }

    #[test]
    fn missing_keys_disable_auth_only_in_development() {
        std::env::remove_var("KVITTO_API_KEYS");
        let dev = AuthState::from_env(true).expect("development tolerates no keys");
        assert!(!dev.enabled);
        assert!(AuthState::from_env(false).is_err());
    }

    #[tokio::test]
    async fn each_caller_spends_its_own_budget() {
        let limiter = RateLimitState::new(2, Duration::from_secs(60));
        assert!(limiter.try_admit("kv_a").await);
        assert!(limiter.try_admit("kv_a").await);
        assert!(
            !limiter.try_admit("kv_a").await,
            "third request in the window is over budget"
        );
        assert!(
            limiter.try_admit("kv_b").await,
            "one caller's exhaustion must not affect another"
        );
    }

    #[tokio::test]
    async fn budget_replenishes_when_the_window_turns_over() {
        let limiter = RateLimitState::new(1, Duration::from_millis(10));
        assert!(limiter.try_admit("kv_a").await);
        assert!(!limiter.try_admit("kv_a").await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(limiter.try_admit("kv_a").await);
    }
}
