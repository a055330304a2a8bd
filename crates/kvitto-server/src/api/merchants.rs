use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use kvitto_auth::AuthError;
use kvitto_core::ProviderId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, ApiResponse, ResponseMeta};
use crate::middleware::RequestId;
use crate::state::{sync_directory, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct OnboardRequest {
    pub provider: ProviderId,
    pub merchant_id: String,
    pub code: String,
    pub redirect_uri: String,
}

#[derive(Debug, Serialize)]
pub(super) struct OnboardResponse {
    pub credential_id: Uuid,
    pub provider: ProviderId,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub(super) struct DisconnectResponse {
    pub disconnected: bool,
}

/// `POST /v1/merchants` — exchange an OAuth authorization code, probe the
/// connection, and pull the merchant's locations into the directory.
pub(super) async fn onboard_merchant(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<OnboardRequest>,
) -> Result<Json<ApiResponse<OnboardResponse>>, ApiError> {
    let credential_id = state
        .store
        .onboard(body.provider, &body.merchant_id, &body.code, &body.redirect_uri)
        .await
        .map_err(|e| map_auth_error(req_id.0.clone(), &e))?;

    let connection = match state.build_connection(credential_id).await {
        Ok(c) => c,
        Err(e) => {
            state.store.remove(credential_id).await;
            tracing::error!(error = %e, "onboarding: could not build provider adapter");
            return Err(ApiError::new(
                req_id.0,
                "internal_error",
                "could not initialize the provider connection",
            ));
        }
    };

    if let Err(e) = connection.test_connection().await {
        state.store.remove(credential_id).await;
        tracing::warn!(provider = %body.provider, error = %e, "onboarding: connection probe failed");
        return Err(ApiError::new(
            req_id.0,
            "provider_unavailable",
            "provider connection probe failed; credential discarded",
        ));
    }

    state.connections.insert(credential_id, connection).await;
    sync_directory(&state, Utc::now()).await;
    tracing::info!(provider = %body.provider, %credential_id, "merchant onboarded");

    Ok(Json(ApiResponse {
        data: OnboardResponse {
            credential_id,
            provider: body.provider,
            status: "connected",
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// `DELETE /v1/merchants/{credential_id}` — disconnect a merchant and
/// destroy the stored credential.
pub(super) async fn disconnect_merchant(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(credential_id): Path<Uuid>,
) -> Result<Json<ApiResponse<DisconnectResponse>>, ApiError> {
    if !state.store.remove(credential_id).await {
        return Err(ApiError::new(
            req_id.0,
            "not_found",
            format!("no credential stored under {credential_id}"),
        ));
    }
    state.connections.remove(credential_id).await;
    tracing::info!(%credential_id, "merchant disconnected");

    Ok(Json(ApiResponse {
        data: DisconnectResponse { disconnected: true },
        meta: ResponseMeta::new(req_id.0),
    }))
}

fn map_auth_error(request_id: String, error: &AuthError) -> ApiError {
    match error {
        AuthError::InvalidGrant { reason, .. } => ApiError::new(
            request_id,
            "invalid_grant",
            format!("provider rejected the authorization code: {reason}"),
        ),
        AuthError::Upstream { provider, status } => {
            tracing::warn!(%provider, status, "onboarding: token endpoint error");
            ApiError::new(request_id, "upstream_error", "provider token endpoint failed")
        }
        AuthError::Http(e) => {
            tracing::warn!(error = %e, "onboarding: token endpoint unreachable");
            ApiError::new(
                request_id,
                "provider_unavailable",
                "provider token endpoint unreachable",
            )
        }
        other => {
            tracing::error!(error = %other, "onboarding failed");
            ApiError::new(request_id, "internal_error", "onboarding failed")
        }
    }
}
