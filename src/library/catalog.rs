use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::try_join_all;

use super::{category_names, MediaLibrary};
use crate::cache::{CacheTag, ALL_CATEGORIES};
use crate::error::{AppError, AppResult};
use crate::types::{FileListing, FileRecord, FilesQuery};

pub const DEFAULT_PAGE_SIZE: usize = 20;
/// Query value of `limit` that disables pagination.
pub const NO_LIMIT: &str = "no-limit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLimit {
    Limited(usize),
    Unlimited,
}

/// A parsed `GET /files` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRequest {
    pub category: String,
    pub page: usize,
    pub limit: PageLimit,
}

impl ListingRequest {
    /// Lenient parsing: a missing, malformed or zero `page` means 1, a
    /// missing, malformed or zero `limit` means 20, a missing `category`
    /// means every category.
    pub fn from_query(query: &FilesQuery) -> Self {
        let page = query
            .page
            .as_deref()
            .and_then(|p| p.trim().parse::<usize>().ok())
            .filter(|p| *p > 0)
            .unwrap_or(1);
        let limit = match query.limit.as_deref().map(str::trim) {
            Some(NO_LIMIT) => PageLimit::Unlimited,
            Some(l) => PageLimit::Limited(l.parse::<usize>().ok().filter(|l| *l > 0).unwrap_or(DEFAULT_PAGE_SIZE)),
            None => PageLimit::Limited(DEFAULT_PAGE_SIZE),
        };
        let category = query
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(ALL_CATEGORIES)
            .to_string();
        Self { category, page, limit }
    }

    pub fn cache_key(&self) -> String {
        match self.limit {
            PageLimit::Limited(l) => format!("files_{}_{}_{}", self.category, self.page, l),
            PageLimit::Unlimited => format!("files_{}_{}_{}", self.category, self.page, NO_LIMIT),
        }
    }
}

/// Cuts one page out of the full listing. Pages past the end are empty.
pub fn paginate(files: Vec<FileRecord>, page: usize, limit: PageLimit) -> FileListing {
    let total_files = files.len();
    match limit {
        PageLimit::Unlimited => FileListing { files, current_page: 1, total_pages: 1, total_files },
        PageLimit::Limited(limit) => {
            let limit = limit.max(1);
            let start = page.saturating_sub(1).saturating_mul(limit).min(total_files);
            let end = start.saturating_add(limit).min(total_files);
            let files = files.into_iter().skip(start).take(end - start).collect();
            FileListing { files, current_page: page, total_pages: total_files.div_ceil(limit), total_files }
        }
    }
}

/// RFC 3339 UTC with milliseconds, e.g. `2024-05-01T12:00:00.000Z`.
pub fn format_mtime(metadata: &Metadata) -> String {
    let modified: DateTime<Utc> = metadata.modified().map(DateTime::from).unwrap_or(DateTime::UNIX_EPOCH);
    modified.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn file_record(category: &str, name: &str, path: &Path, metadata: &Metadata) -> FileRecord {
    FileRecord {
        name: name.to_string(),
        category: category.to_string(),
        url: format!("/images/{}/{}", category, name),
        filepath: path.to_string_lossy().to_string(),
        size: metadata.len(),
        last_modified: format_mtime(metadata),
    }
}

/// Regular files directly inside one category directory, in enumeration
/// order.
async fn category_files(category: String, dir: PathBuf) -> io::Result<Vec<FileRecord>> {
    let mut records = Vec::new();
    let mut rd = match tokio::fs::read_dir(&dir).await {
        Ok(rd) => rd,
        // Removed between enumerating the root and reading it.
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(records),
        Err(e) => return Err(e),
    };
    while let Some(entry) = rd.next_entry().await? {
        let file_type = match entry.file_type().await {
            Ok(ft) => ft,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        if !file_type.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            tracing::warn!("Skipping file with non UTF-8 name in {}", dir.display());
            continue;
        };
        let metadata = match entry.metadata().await {
            Ok(md) => md,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        records.push(file_record(&category, &name, &entry.path(), &metadata));
    }
    Ok(records)
}

impl MediaLibrary {
    /// One page of files, served from the cache when possible.
    ///
    /// Files come in directory-enumeration order, category by category.
    /// That order is whatever the OS returns and is not sorted.
    pub async fn list_files(&self, request: &ListingRequest) -> AppResult<FileListing> {
        let key = request.cache_key();
        let tags = vec![CacheTag::listing(&request.category)];
        self.cache
            .get_or_compute(&key, tags, || async {
                let files = self
                    .collect_files(&request.category)
                    .await
                    .map_err(|e| AppError::operation("Error reading files", e))?;
                Ok(paginate(files, request.page, request.limit))
            })
            .await
    }

    /// Every file of `category` (or of all categories), unpaginated.
    pub async fn collect_files(&self, category: &str) -> io::Result<Vec<FileRecord>> {
        let root = self.root();
        let names = category_names(&root).await?;
        let selected = names.into_iter().filter(|name| category == ALL_CATEGORIES || name == category).map(|name| {
            let dir = root.join(&name);
            category_files(name, dir)
        });
        Ok(try_join_all(selected).await?.into_iter().flatten().collect())
    }
}
