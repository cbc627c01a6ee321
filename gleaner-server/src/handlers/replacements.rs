use axum::{Json, extract::State};
use gleaner_model::{
    ApiResponse, ReplacementMap,
    api::{ReplacementsResponse, SaveReplacementsRequest},
};
use tracing::info;

use crate::infra::{app_state::AppState, errors::AppResult};

pub async fn get_replacements_handler(
    State(state): State<AppState>,
) -> Json<ApiResponse<ReplacementsResponse>> {
    let replacements = state.orchestrator().replacements().await;
    Json(ApiResponse::success(response(replacements)))
}

/// Replaces the whole stored map. Every entry is validated before anything
/// is written.
pub async fn save_replacements_handler(
    State(state): State<AppState>,
    Json(request): Json<SaveReplacementsRequest>,
) -> AppResult<Json<ApiResponse<ReplacementsResponse>>> {
    let saved = state
        .orchestrator()
        .save_replacements(request.replacements)
        .await?;
    info!(count = saved.len(), "replacement map saved");
    Ok(Json(ApiResponse::success(response(saved))))
}

fn response(replacements: ReplacementMap) -> ReplacementsResponse {
    ReplacementsResponse {
        count: replacements.len(),
        replacements,
    }
}
