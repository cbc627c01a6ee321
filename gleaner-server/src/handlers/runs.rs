use std::{convert::Infallible, time::Duration};

use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{
        IntoResponse, Response, Sse,
        sse::{Event, KeepAlive},
    },
};
use gleaner_core::CancelOutcome;
use gleaner_model::{
    ApiResponse, RunEventFrame, RunId, RunView,
    api::{
        CreateRunRequest, ResolveRunRequest, RunAcceptedResponse,
        RunCancelResponse, RunResolvedResponse,
    },
};
use tokio_stream::{Stream, StreamExt};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

const ARCHIVE_CONTENT_TYPE: &str = "application/zstd";

pub async fn create_run_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateRunRequest>,
) -> AppResult<impl IntoResponse> {
    let run_id = state.orchestrator().create_run(request.items).await?;
    info!(run = %run_id, "run accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(RunAcceptedResponse { run_id })),
    ))
}

pub async fn get_run_handler(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
) -> AppResult<Json<ApiResponse<RunView>>> {
    let view = state.orchestrator().snapshot(&run_id)?;
    Ok(Json(ApiResponse::success(view)))
}

/// Live run events as server-sent events. The stream closes after the
/// attempt's terminal event; earlier events are not replayed.
pub async fn run_events_sse_handler(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let subscription = state.orchestrator().subscribe(&run_id)?;
    let stream = subscription
        .into_stream()
        .filter_map(|frame| frame_to_event(frame).map(Ok));
    Ok(Sse::new(stream).keep_alive(default_keep_alive()))
}

pub async fn resolve_run_handler(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
    Json(request): Json<ResolveRunRequest>,
) -> AppResult<impl IntoResponse> {
    let attempt = state
        .orchestrator()
        .resolve(&run_id, request.replacements)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(RunResolvedResponse { run_id, attempt })),
    ))
}

pub async fn cancel_run_handler(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
) -> Json<ApiResponse<RunCancelResponse>> {
    let cancelled = matches!(
        state.orchestrator().cancel(&run_id).await,
        CancelOutcome::Cancelled { .. }
    );
    Json(ApiResponse::success(RunCancelResponse { run_id, cancelled }))
}

pub async fn download_archive_handler(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
) -> AppResult<Response> {
    let archive = state.orchestrator().download(&run_id).await?;
    let file = tokio::fs::File::open(&archive.path).await.map_err(|err| {
        warn!(
            run = %run_id,
            path = %archive.path.display(),
            error = %err,
            "archive vanished before it could be opened"
        );
        AppError::not_found(format!("archive for run {run_id} is unavailable"))
    })?;

    let disposition =
        HeaderValue::from_str(&content_disposition(&archive.file_name))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(ARCHIVE_CONTENT_TYPE),
            ),
            (header::CONTENT_LENGTH, HeaderValue::from(archive.len)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

fn content_disposition(file_name: &str) -> String {
    let escaped: String = file_name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if c == '"' { '\'' } else { c })
        .collect();
    format!("attachment; filename=\"{escaped}\"")
}

fn frame_to_event(frame: RunEventFrame) -> Option<Event> {
    let name = frame.event.event_name();
    serde_json::to_string(&frame.event)
        .map(|data| {
            Event::default()
                .event(name)
                .data(data)
                .id(frame.sequence.to_string())
        })
        .map_err(|err| {
            warn!(run = %frame.run_id, "failed to encode run event: {err}");
            err
        })
        .ok()
}

fn default_keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(15))
        .text("keep-alive")
}
