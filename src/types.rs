use serde::{Deserialize, Serialize};

/// One file inside a category, as returned by listings and moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub name: String,
    pub category: String,
    pub url: String,
    pub filepath: String,
    pub size: u64,
    pub last_modified: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListing {
    pub files: Vec<FileRecord>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_files: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub name: String,
    pub file_count: u32,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryStats {
    pub total_images: u32,
    pub categories: u32,
    pub storage_used: u64,
}

// Query for GET /files. Values stay strings so malformed numbers fall back
// to defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilesQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryRequest {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameCategoryRequest {
    pub old_name: String,
    pub new_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveFileCategoryRequest {
    pub old_category: String,
    pub new_category: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteFileRequest {
    pub category: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderPathPayload {
    pub folder_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveFileResponse {
    pub success: bool,
    pub file: FileRecord,
    pub source_cleanup_failed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MovedFileResponse {
    pub success: bool,
    pub file: FileRecord,
}
