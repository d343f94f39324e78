use axum::{
    extract::{Multipart, Path, Query, Request, State},
    response::{IntoResponse, Response},
    Json,
};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::error::{AppError, AppResult};
use crate::library::{validate_category_name, validate_entry_name, ListingRequest};
use crate::state::AppState;
use crate::types::{
    DeleteFileRequest, FileListing, FilesQuery, MoveFileCategoryRequest, MoveFileResponse, MovedFileResponse,
    SuccessResponse,
};

// GET /files?page=&limit=&category=
pub async fn list_files(State(state): State<AppState>, Query(q): Query<FilesQuery>) -> AppResult<Json<FileListing>> {
    let request = ListingRequest::from_query(&q);
    Ok(Json(state.library.list_files(&request).await?))
}

// POST /move-file (multipart: originalPath, category)
pub async fn move_file(State(state): State<AppState>, mut form: Multipart) -> AppResult<Json<MoveFileResponse>> {
    let mut original_path: Option<String> = None;
    let mut category: Option<String> = None;

    while let Some(field) =
        form.next_field().await.map_err(|e| AppError::BadRequest(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        let value = field.text().await.map_err(|e| AppError::BadRequest(format!("invalid multipart field: {}", e)))?;
        match name.as_deref() {
            Some("originalPath") if original_path.is_none() => original_path = Some(value),
            Some("category") if category.is_none() => category = Some(value),
            _ => {}
        }
    }

    let source = original_path.ok_or_else(|| AppError::BadRequest("No file path provided".into()))?;
    let outcome = state.library.move_in(&source, category.as_deref()).await?;
    Ok(Json(MoveFileResponse {
        success: true,
        file: outcome.file,
        source_cleanup_failed: outcome.source_cleanup_failed,
    }))
}

// POST /move-file-category
pub async fn move_file_category(
    State(state): State<AppState>,
    Json(req): Json<MoveFileCategoryRequest>,
) -> AppResult<Json<MovedFileResponse>> {
    let file = state.library.move_between(&req.old_category, &req.new_category, &req.file_name).await?;
    Ok(Json(MovedFileResponse { success: true, file }))
}

// POST /delete-file
pub async fn delete_file(
    State(state): State<AppState>,
    Json(req): Json<DeleteFileRequest>,
) -> AppResult<Json<SuccessResponse>> {
    state.library.delete_file(&req.category, &req.name).await?;
    Ok(Json(SuccessResponse::ok()))
}

// GET /images/{category}/{file}
//
// Resolved against the root at request time, so a root change applies to
// the very next request.
pub async fn serve_image(
    State(state): State<AppState>,
    Path((category, file)): Path<(String, String)>,
    req: Request,
) -> AppResult<Response> {
    let category = validate_category_name("category", &category)?;
    let file = validate_entry_name("file", &file)?;
    let path = state.library.root().join(category).join(file);

    match tokio::fs::metadata(&path).await {
        Ok(md) if md.is_file() => {}
        Ok(_) => return Err(AppError::NotFound(format!("image '{}/{}' not found", category, file))),
        Err(e) => return Err(AppError::from_io(e, &format!("image '{}/{}'", category, file), "Error reading file")),
    }

    match ServeFile::new(&path).oneshot(req).await {
        Ok(res) => Ok(res.into_response()),
        Err(never) => match never {},
    }
}
