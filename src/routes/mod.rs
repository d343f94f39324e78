//! HTTP route handlers for the LockerZ API.
//!
//! - `categories`: category listing, aggregates and mutations
//! - `files`: listings, moves, deletes and image serving
//! - `health`: liveness, readiness, metrics and build info
//! - `settings`: the user settings document and library root

pub mod categories;
pub mod files;
pub mod health;
pub mod settings;

use std::any::Any;

use axum::extract::DefaultBodyLimit;
use axum::http::{StatusCode, Uri};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::error::AppError;
use crate::middleware;
use crate::state::AppState;

/// Builds the full application router with all middleware layers.
pub fn router(state: AppState) -> Router {
    let cfg_arc = state.config.clone();

    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(health::metrics))
        .route("/version", get(health::version))
        .route("/files", get(files::list_files))
        .route("/move-file", post(files::move_file))
        .route("/move-file-category", post(files::move_file_category))
        .route("/delete-file", post(files::delete_file))
        .route("/images/{category}/{file}", get(files::serve_image))
        .route("/categories", get(categories::list_categories))
        .route("/stats", get(categories::stats))
        .route("/create-category", post(categories::create_category))
        .route("/rename-category", post(categories::rename_category))
        .route("/delete-category", post(categories::delete_category))
        .route("/get-folder-path", get(settings::get_folder_path))
        .route("/update-folder-path", post(settings::update_folder_path))
        .route("/get-settings", get(settings::get_settings))
        .route("/update-settings", post(settings::update_settings))
        .fallback(not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(middleware::validation::max_body_size()))
        .layer(from_fn(middleware::validation::validate_request_middleware))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(cfg_arc, middleware::security_headers::security_headers_middleware))
        .layer(CatchPanicLayer::custom(panic_response))
        // The desktop UI is served from its own origin
        .layer(CorsLayer::permissive())
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("no route for {}", uri.path()))
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("Handler panicked: {}", detail);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": {
                "code": "INTERNAL_ERROR",
                "message": "An internal server error occurred",
            },
            "status": 500,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
        .into_response()
}
