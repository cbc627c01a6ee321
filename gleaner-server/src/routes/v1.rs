use axum::{
    Router,
    routing::{get, post},
};
use gleaner_model::api::routes::v1;

use crate::{
    AppState,
    handlers::{
        history::list_history_handler,
        replacements::{get_replacements_handler, save_replacements_handler},
        runs::{
            cancel_run_handler, create_run_handler, download_archive_handler,
            get_run_handler, resolve_run_handler, run_events_sse_handler,
        },
    },
};

/// Create all v1 API routes
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route(v1::RUNS, post(create_run_handler))
        .route(v1::RUN, get(get_run_handler))
        .route(v1::RUN_EVENTS, get(run_events_sse_handler))
        .route(v1::RUN_RESOLVE, post(resolve_run_handler))
        .route(v1::RUN_CANCEL, post(cancel_run_handler))
        .route(v1::RUN_ARCHIVE, get(download_archive_handler))
        .route(v1::HISTORY, get(list_history_handler))
        .route(
            v1::REPLACEMENTS,
            get(get_replacements_handler).put(save_replacements_handler),
        )
}
