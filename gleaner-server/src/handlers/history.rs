use axum::{Json, extract::State};
use gleaner_model::{ApiResponse, api::HistoryResponse};

use crate::infra::app_state::AppState;

/// Every recorded attempt outcome, most recent first.
pub async fn list_history_handler(
    State(state): State<AppState>,
) -> Json<ApiResponse<HistoryResponse>> {
    let history = state.orchestrator().list_history().await;
    let count = history.len();
    Json(ApiResponse::success(HistoryResponse { history, count }))
}
