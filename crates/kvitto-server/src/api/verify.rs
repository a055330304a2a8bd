use axum::{extract::State, Extension, Json};
use chrono::Utc;
use kvitto_core::MatchResult;
use kvitto_match::{PurchaseClaim, VerifyError};

use super::{ApiError, ApiResponse, ResponseMeta};
use crate::middleware::RequestId;
use crate::state::{sync_directory, AppState};

/// `POST /v1/verify` — reconcile a purchase claim against provider
/// transactions.
///
/// The claimed amount is interpreted in the located business's settlement
/// currency; the request body carries no currency of its own.
pub(super) async fn verify_purchase(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(claim): Json<PurchaseClaim>,
) -> Result<Json<ApiResponse<MatchResult>>, ApiError> {
    let now = Utc::now();
    if state.directory.needs_refresh(now).await {
        sync_directory(&state, now).await;
    }

    let Some(location) = state.directory.location(&claim.location_id).await else {
        return Err(ApiError::new(
            req_id.0,
            "unknown_location",
            format!("location {} is not in the directory", claim.location_id),
        ));
    };
    let Some(provider) = state.connections.provider_for_location(&claim.location_id).await else {
        return Err(ApiError::new(
            req_id.0,
            "unknown_location",
            format!("no connected merchant owns location {}", claim.location_id),
        ));
    };

    match state
        .matcher
        .verify_purchase(provider.as_ref(), &claim, &location.currency, now)
        .await
    {
        Ok(result) => Ok(Json(ApiResponse {
            data: result,
            meta: ResponseMeta::new(req_id.0),
        })),
        Err(e) => Err(map_verify_error(req_id.0, &e)),
    }
}

fn map_verify_error(request_id: String, error: &VerifyError) -> ApiError {
    match error {
        VerifyError::ProviderUnavailable { reason } => {
            tracing::warn!(reason = %reason, "verification aborted: provider unavailable");
            ApiError::new(
                request_id,
                "provider_unavailable",
                "provider did not answer in time; retry the verification",
            )
        }
        VerifyError::Provider(e) => {
            tracing::error!(error = %e, "verification failed upstream");
            ApiError::new(request_id, "upstream_error", "provider request failed")
        }
        VerifyError::Amount(e) => {
            ApiError::new(request_id, "validation_error", e.to_string())
        }
    }
}
