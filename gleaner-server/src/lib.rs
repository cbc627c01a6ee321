//! # Gleaner Server
//!
//! HTTP surface for the Gleaner run orchestrator: create catalog runs,
//! follow them over server-sent events, resolve over-length labels, cancel,
//! and download the finished archives.

pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;

use axum::{
    Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    response::Json,
    routing::get,
};
use serde_json::{Value, json};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::debug;

pub fn create_app(state: AppState) -> Router {
    let versioned_api = routes::create_api_router();

    // Build CORS layer (permissive in dev, allow-list in prod)
    let cors_layer = if state.config().dev_mode {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config()
            .cors
            .allowed_origins
            .iter()
            .filter_map(|s| HeaderValue::from_str(s.trim()).ok())
            .collect();
        let allow_origin = if origins.is_empty() {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(origins)
        };

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(AllowMethods::list([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::OPTIONS,
            ]))
            .allow_headers(AllowHeaders::list([
                header::CONTENT_TYPE,
                header::ACCEPT,
                header::HeaderName::from_static("last-event-id"),
            ]))
    };

    Router::new()
        .route("/ping", get(ping_handler))
        .route("/health", get(health_handler))
        .merge(versioned_api)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ping_handler() -> Json<Value> {
    debug!("ping endpoint called");
    Json(json!({
        "status": "ok",
        "message": "Gleaner server is running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let output_dir = state.orchestrator().output_dir();
    let output_ready = tokio::fs::metadata(output_dir)
        .await
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false);
    let active_attempts = state.orchestrator().active_attempts().await;

    let mut health_status = json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "checks": {
            "output_dir": {
                "status": if output_ready { "healthy" } else { "unhealthy" },
                "path": output_dir.display().to_string(),
            },
            "runs": {
                "status": "healthy",
                "active_attempts": active_attempts,
            }
        }
    });

    if output_ready {
        Ok(Json(health_status))
    } else {
        health_status["status"] = json!("unhealthy");
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(health_status)))
    }
}
