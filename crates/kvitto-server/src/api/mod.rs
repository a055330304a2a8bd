mod merchants;
mod stats;
mod verify;
mod webhooks;

use axum::{
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" | "unknown_location" => StatusCode::NOT_FOUND,
            "unauthorized" | "invalid_signature" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" | "invalid_grant" => StatusCode::BAD_REQUEST,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "provider_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            "upstream_error" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/v1/verify", post(verify::verify_purchase))
        .route("/v1/merchants", post(merchants::onboard_merchant))
        .route(
            "/v1/merchants/{credential_id}",
            axum::routing::delete(merchants::disconnect_merchant),
        )
        .route("/v1/stats", get(stats::get_stats))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    // Webhook deliveries carry their own HMAC; they bypass bearer auth.
    let public_routes = Router::new()
        .route("/healthz", get(health))
        .route("/v1/webhooks/{provider}", post(webhooks::handle_webhook));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(Extension(req_id): Extension<RequestId>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ApiResponse {
            data: HealthData { status: "ok" },
            meta: ResponseMeta::new(req_id.0),
        }),
    )
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::Duration as ChronoDuration;
    use kvitto_auth::{CredentialStore, OauthClient};
    use kvitto_core::{AppConfig, Environment, ProviderRegistry};
    use kvitto_directory::Directory;
    use kvitto_match::{Matcher, TransactionCache};
    use kvitto_webhook::WebhookGateway;
    use tower::ServiceExt;

    use super::*;
    use crate::state::Connections;

    fn test_config() -> AppConfig {
        AppConfig {
            env: Environment::Test,
            bind_addr: "127.0.0.1:0".parse().expect("addr"),
            log_level: "info".to_owned(),
            providers_path: "config/providers.yaml".into(),
            provider_request_timeout_secs: 5,
            provider_max_retries: 1,
            provider_backoff_base_secs: 0,
            rate_limit_default_wait_secs: 0,
            provider_max_pages: 10,
            directory_ttl_secs: 600,
            transaction_cache_ttl_secs: 300,
            default_tolerance_minutes: 2,
            token_refresh_margin_secs: 60,
        }
    }

    fn test_state() -> AppState {
        let config = Arc::new(test_config());
        let registry = Arc::new(ProviderRegistry { providers: vec![] });
        let store = Arc::new(CredentialStore::new(
            OauthClient::new(config.provider_request_timeout_secs).expect("oauth client"),
            Arc::clone(&registry),
            ChronoDuration::seconds(config.token_refresh_margin_secs),
        ));
        let cache = Arc::new(TransactionCache::new(ChronoDuration::seconds(
            i64::try_from(config.transaction_cache_ttl_secs).expect("ttl fits"),
        )));
        let matcher = Arc::new(Matcher::new(
            Arc::clone(&cache),
            ChronoDuration::minutes(config.default_tolerance_minutes),
            std::time::Duration::from_secs(config.provider_request_timeout_secs),
        ));
        let gateway = Arc::new(WebhookGateway::new(
            Arc::clone(&registry),
            Arc::clone(&cache),
            ChronoDuration::hours(24),
        ));
        AppState {
            config,
            registry,
            store,
            connections: Arc::new(Connections::new()),
            directory: Arc::new(Directory::new(ChronoDuration::seconds(600))),
            cache,
            matcher,
            gateway,
        }
    }

    fn test_app() -> Router {
        std::env::remove_var("KVITTO_API_KEYS");
        let auth = AuthState::from_env(true).expect("auth");
        build_app(test_state(), auth, default_rate_limit_state())
    }

    #[tokio::test]
    async fn health_returns_ok_with_request_id() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn incoming_request_id_is_echoed() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .header("x-request-id", "req-fixed")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(
            response.headers().get("x-request-id").map(|v| v.to_str().unwrap()),
            Some("req-fixed")
        );
    }

    #[tokio::test]
    async fn verify_with_unknown_location_is_not_found() {
        let body = serde_json::json!({
            "location_id": "loc-unknown",
            "amount": "65.50",
            "timestamp": "2025-06-01T14:31:30Z"
        });
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/verify")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(json["error"]["code"].as_str(), Some("unknown_location"));
    }

    #[tokio::test]
    async fn stats_reports_empty_engine() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/v1/stats")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(json["data"]["credentials"]["total"].as_u64(), Some(0));
        assert_eq!(json["data"]["cache"]["window_entries"].as_u64(), Some(0));
        assert!(json["data"]["directory"]["age_secs"].is_null());
    }

    #[tokio::test]
    async fn webhook_for_unconfigured_provider_is_not_found() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/webhooks/zettle")
                    .header("x-payload-signature", "deadbeef")
                    .body(Body::from("{}"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn webhook_with_unknown_provider_name_is_bad_request() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/webhooks/clover")
                    .body(Body::from("{}"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn api_error_maps_codes_to_statuses() {
        let cases = [
            ("unknown_location", StatusCode::NOT_FOUND),
            ("invalid_signature", StatusCode::UNAUTHORIZED),
            ("provider_unavailable", StatusCode::SERVICE_UNAVAILABLE),
            ("upstream_error", StatusCode::BAD_GATEWAY),
            ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (code, status) in cases {
            let response = ApiError::new("req-1", code, "msg").into_response();
            assert_eq!(response.status(), status, "code {code}");
        }
    }
}
