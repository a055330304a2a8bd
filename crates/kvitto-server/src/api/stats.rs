use axum::{extract::State, Extension, Json};
use chrono::Utc;
use kvitto_auth::CredentialStats;
use kvitto_directory::DirectoryStats;
use kvitto_match::CacheStats;
use serde::Serialize;

use super::{ApiResponse, ResponseMeta};
use crate::middleware::RequestId;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub(super) struct StatsData {
    pub credentials: CredentialStats,
    pub cache: CacheStats,
    pub directory: DirectoryStats,
}

/// `GET /v1/stats` — read-only engine counters for monitoring.
pub(super) async fn get_stats(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<StatsData>> {
    let now = Utc::now();
    Json(ApiResponse {
        data: StatsData {
            credentials: state.store.stats().await,
            cache: state.cache.stats().await,
            directory: state.directory.stats(now).await,
        },
        meta: ResponseMeta::new(req_id.0),
    })
}
