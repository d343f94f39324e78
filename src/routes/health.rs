use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

// Liveness: the process answers
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// Readiness: the library root is reachable, with timeout protection for slow mounts
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let root = state.library.root();
    let check = tokio::fs::metadata(&root);
    match tokio::time::timeout(std::time::Duration::from_secs(5), check).await {
        Ok(Ok(md)) if md.is_dir() => (StatusCode::OK, "ready").into_response(),
        Ok(Ok(_)) => (StatusCode::SERVICE_UNAVAILABLE, "not ready: library root is not a directory").into_response(),
        Ok(Err(e)) => (StatusCode::SERVICE_UNAVAILABLE, format!("not ready: {}", e)).into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready: timeout").into_response(),
    }
}

// Metrics endpoint: returns JSON snapshot
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let mut snapshot = serde_json::to_value(state.metrics.get_snapshot()).unwrap_or_default();
    snapshot["cache_entries"] = serde_json::json!(state.library.cache().len());
    Json(snapshot)
}

// Version/Build info endpoint (JSON)
pub async fn version() -> impl IntoResponse {
    let body = serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "package": {
            "description": env!("CARGO_PKG_DESCRIPTION"),
            "authors": env!("CARGO_PKG_AUTHORS"),
            "license": env!("CARGO_PKG_LICENSE"),
        },
        "build": {
            "profile": if cfg!(debug_assertions) { "debug" } else { "release" },
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        }
    });
    (StatusCode::OK, Json(body))
}
