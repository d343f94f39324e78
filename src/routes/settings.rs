use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::AppResult;
use crate::settings::{Settings, SettingsUpdate};
use crate::state::AppState;
use crate::types::{FolderPathPayload, SuccessResponse};

#[derive(Serialize)]
pub struct UpdateSettingsResponse {
    success: bool,
    settings: Settings,
}

// GET /get-folder-path
pub async fn get_folder_path(State(state): State<AppState>) -> Json<FolderPathPayload> {
    Json(FolderPathPayload { folder_path: state.settings.folder_path().to_string_lossy().into_owned() })
}

// POST /update-folder-path
pub async fn update_folder_path(
    State(state): State<AppState>,
    Json(req): Json<FolderPathPayload>,
) -> AppResult<Json<SuccessResponse>> {
    let root = state.settings.set_folder_path(&req.folder_path).await?;
    state.library.set_root(root.clone());
    tracing::info!("Library root changed to {}", root.display());
    Ok(Json(SuccessResponse::ok()))
}

// GET /get-settings
pub async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.settings.get())
}

// POST /update-settings (partial document, known fields only)
pub async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> AppResult<Json<UpdateSettingsResponse>> {
    let previous_root = state.settings.folder_path();
    let settings = state.settings.update(update).await?;
    if settings.folder_path != previous_root {
        state.library.set_root(settings.folder_path.clone());
        tracing::info!("Library root changed to {}", settings.folder_path.display());
    }
    Ok(Json(UpdateSettingsResponse { success: true, settings }))
}
