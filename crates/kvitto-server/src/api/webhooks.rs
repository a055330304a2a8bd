use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Extension, Json,
};
use chrono::Utc;
use kvitto_core::ProviderId;
use kvitto_webhook::{Disposition, WebhookError};
use serde::Serialize;

use super::{ApiError, ApiResponse, ResponseMeta};
use crate::middleware::RequestId;
use crate::state::AppState;

/// Header names providers use for the payload HMAC, in lookup order.
const SIGNATURE_HEADERS: [&str; 3] = [
    "x-payload-signature",
    "x-izettle-signature",
    "x-webhook-signature",
];

#[derive(Debug, Serialize)]
pub(super) struct WebhookAck {
    pub accepted: bool,
    pub disposition: &'static str,
}

/// `POST /v1/webhooks/{provider}` — ingest one signed provider delivery.
pub(super) async fn handle_webhook(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<WebhookAck>>, ApiError> {
    let provider: ProviderId = provider.parse().map_err(|reason: String| {
        ApiError::new(req_id.0.clone(), "bad_request", reason)
    })?;

    let signature = SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    match state.gateway.handle(provider, &body, signature, Utc::now()).await {
        Ok(disposition) => Ok(Json(ApiResponse {
            data: WebhookAck {
                accepted: true,
                disposition: disposition_name(disposition),
            },
            meta: ResponseMeta::new(req_id.0),
        })),
        Err(e) => Err(map_webhook_error(req_id.0, &e)),
    }
}

fn disposition_name(disposition: Disposition) -> &'static str {
    match disposition {
        Disposition::Processed => "processed",
        Disposition::Duplicate => "duplicate",
        Disposition::Ignored => "ignored",
    }
}

fn map_webhook_error(request_id: String, error: &WebhookError) -> ApiError {
    match error {
        WebhookError::InvalidSignature { provider } => ApiError::new(
            request_id,
            "invalid_signature",
            format!("signature verification failed for {provider}"),
        ),
        WebhookError::Payload(e) => {
            ApiError::new(request_id, "bad_request", format!("malformed event: {e}"))
        }
        WebhookError::UnknownProvider(provider) => ApiError::new(
            request_id,
            "not_found",
            format!("no provider app configured for {provider}"),
        ),
        WebhookError::Processing { event_id, source } => {
            tracing::error!(%event_id, error = %source, "webhook processing failed");
            ApiError::new(request_id, "internal_error", "event processing failed")
        }
    }
}
