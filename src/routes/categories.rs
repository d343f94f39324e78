use axum::{extract::State, Json};

use crate::error::AppResult;
use crate::state::AppState;
use crate::types::{CategoryRequest, CategorySummary, LibraryStats, RenameCategoryRequest, SuccessResponse};

// GET /categories
pub async fn list_categories(State(state): State<AppState>) -> AppResult<Json<Vec<CategorySummary>>> {
    Ok(Json(state.library.category_summaries().await?))
}

// GET /stats
pub async fn stats(State(state): State<AppState>) -> AppResult<Json<LibraryStats>> {
    Ok(Json(state.library.library_stats().await?))
}

// POST /create-category
pub async fn create_category(
    State(state): State<AppState>,
    Json(req): Json<CategoryRequest>,
) -> AppResult<Json<SuccessResponse>> {
    state.library.create_category(&req.name).await?;
    Ok(Json(SuccessResponse::ok()))
}

// POST /rename-category
pub async fn rename_category(
    State(state): State<AppState>,
    Json(req): Json<RenameCategoryRequest>,
) -> AppResult<Json<SuccessResponse>> {
    state.library.rename_category(&req.old_name, &req.new_name).await?;
    Ok(Json(SuccessResponse::ok()))
}

// POST /delete-category (recursive)
pub async fn delete_category(
    State(state): State<AppState>,
    Json(req): Json<CategoryRequest>,
) -> AppResult<Json<SuccessResponse>> {
    state.library.delete_category(&req.name).await?;
    Ok(Json(SuccessResponse::ok()))
}
