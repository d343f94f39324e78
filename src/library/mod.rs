//! The image library on disk.
//!
//! A library is a root directory whose direct subdirectories are the
//! categories. [`MediaLibrary`] owns the current root together with the
//! response cache and the directory aggregator; every read goes through the
//! cache and every mutation invalidates it before returning.

pub mod catalog;
pub mod categories;
pub mod mover;
pub mod stats;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::cache::ResponseCache;
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;

pub use catalog::{ListingRequest, PageLimit};
pub use mover::{MoveMethod, MoveOutcome};
pub use stats::{DirStats, StatsAggregator};

/// Reserved working directory under the root; never listed as a category.
pub const TEMP_DIR: &str = "temp";
/// Destination of move-in requests that name no category.
pub const DEFAULT_CATEGORY: &str = "uncategorized";

const MAX_NAME_LEN: usize = 255;

pub struct MediaLibrary {
    root: RwLock<PathBuf>,
    cache: ResponseCache,
    aggregator: StatsAggregator,
    metrics: Metrics,
}

impl MediaLibrary {
    pub fn new(root: PathBuf, config: &AppConfig, metrics: Metrics) -> Self {
        Self {
            root: RwLock::new(root),
            cache: ResponseCache::new(config.cache.ttl(), config.cache.capacity, metrics.clone()),
            aggregator: StatsAggregator::new(config.stats.effective_max_open_dirs()),
            metrics,
        }
    }

    /// The current library root.
    pub fn root(&self) -> PathBuf {
        self.root.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Points the library at a new root. Every cached response belonged to
    /// the old tree, so the cache is cleared.
    pub fn set_root(&self, root: PathBuf) {
        {
            let mut guard = self.root.write().unwrap_or_else(|p| p.into_inner());
            *guard = root;
        }
        self.cache.clear();
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn category_path(&self, name: &str) -> PathBuf {
        self.root().join(name)
    }
}

/// Names of the category directories directly under `root`, in the order
/// the OS enumerates them. `temp`, plain files and symlinks are skipped, as
/// are names that are not valid UTF-8.
pub async fn category_names(root: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut rd = tokio::fs::read_dir(root).await?;
    while let Some(entry) = rd.next_entry().await? {
        let file_type = match entry.file_type().await {
            Ok(ft) => ft,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        if !file_type.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) if name != TEMP_DIR => names.push(name),
            Ok(_) => {}
            Err(raw) => tracing::warn!("Skipping category with non UTF-8 name: {:?}", raw),
        }
    }
    Ok(names)
}

/// Checks a single path component supplied by a client (category or file
/// name): non-empty, no separators, no `.`/`..`, no NUL.
pub fn validate_entry_name<'a>(field: &str, value: &'a str) -> AppResult<&'a str> {
    let invalid = |message: &str| AppError::ValidationError { field: field.to_string(), message: message.to_string() };

    if value.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(invalid("must be at most 255 bytes"));
    }
    if value == "." || value == ".." {
        return Err(invalid("must not be a relative path component"));
    }
    if value.contains('/') || value.contains('\\') {
        return Err(invalid("must not contain path separators"));
    }
    if value.contains('\0') {
        return Err(invalid("must not contain null bytes"));
    }
    Ok(value)
}

/// Like [`validate_entry_name`], and additionally refuses the reserved
/// `temp` directory.
pub fn validate_category_name<'a>(field: &str, value: &'a str) -> AppResult<&'a str> {
    let name = validate_entry_name(field, value)?;
    if name == TEMP_DIR {
        return Err(AppError::ValidationError {
            field: field.to_string(),
            message: format!("'{}' is reserved", TEMP_DIR),
        });
    }
    Ok(name)
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use super::MediaLibrary;
    use crate::config::AppConfig;
    use crate::metrics::Metrics;

    /// A root laid out as `{ category: [(file, bytes)] }`, plus `temp`.
    pub fn library_root(layout: &[(&str, &[(&str, usize)])]) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("temp")).unwrap();
        for (category, files) in layout {
            let cat = dir.path().join(category);
            fs::create_dir_all(&cat).unwrap();
            for (name, len) in *files {
                fs::write(cat.join(name), vec![b'x'; *len]).unwrap();
            }
        }
        dir
    }

    pub fn library_at(root: &Path) -> MediaLibrary {
        MediaLibrary::new(root.to_path_buf(), &AppConfig::default(), Metrics::new())
    }
}
