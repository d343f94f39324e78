//! Moving files into and between categories.
//!
//! Move-in accepts any source path on the machine. It tries an atomic
//! `rename` first; when source and library live on different filesystems
//! the rename fails with a cross-device error and the file is copied and
//! the source unlinked instead:
//!
//! ```text
//! Pending -> RenameAttempted -> Success
//!                            -> RenameFailed(EXDEV) -> CopyAttempted -> CopySuccess -> UnlinkAttempted -> Done
//!                                                                    -> CopyFailed -> Failed
//! ```
//!
//! Once the copy exists the move counts as done. A failed unlink is
//! reported in [`MoveOutcome::source_cleanup_failed`], not as an error.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::catalog::file_record;
use super::{validate_category_name, validate_entry_name, MediaLibrary, DEFAULT_CATEGORY};
use crate::error::{AppError, AppResult};
use crate::types::FileRecord;

// EXDEV on unix, ERROR_NOT_SAME_DEVICE on windows
#[cfg(not(windows))]
const CROSS_DEVICE: i32 = 18;
#[cfg(windows)]
const CROSS_DEVICE: i32 = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveMethod {
    Renamed,
    Copied,
}

/// Result of a successful move-in.
#[derive(Debug, Clone)]
pub struct MoveOutcome {
    pub file: FileRecord,
    pub method: MoveMethod,
    /// The copy fallback ran and the source could not be removed afterwards.
    pub source_cleanup_failed: bool,
}

#[derive(Debug)]
pub(crate) struct Relocation {
    pub method: MoveMethod,
    pub source_cleanup_failed: bool,
}

/// Whether `err` is the "rename cannot span filesystems" failure.
pub(crate) fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(CROSS_DEVICE)
}

// Hidden sibling of `destination` that receives the copy before it is
// renamed into place.
fn partial_path(destination: &Path) -> PathBuf {
    let name = destination.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    destination.with_file_name(format!(".{}.{}.partial", name, uuid::Uuid::new_v4().simple()))
}

/// Copies `source` next to `destination`, renames the copy into place and
/// then removes `source` with `unlink`.
///
/// A failed copy only ever removes its own partial file; an existing
/// `destination` is untouched until the complete copy replaces it.
pub(crate) async fn copy_then_unlink<U, UF>(source: &Path, destination: &Path, unlink: U) -> io::Result<Relocation>
where
    U: FnOnce(PathBuf) -> UF,
    UF: Future<Output = io::Result<()>>,
{
    let partial = partial_path(destination);
    let placed = match tokio::fs::copy(source, &partial).await {
        Ok(_) => tokio::fs::rename(&partial, destination).await,
        Err(e) => Err(e),
    };
    if let Err(e) = placed {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e);
    }

    let source_cleanup_failed = match unlink(source.to_path_buf()).await {
        Ok(()) => {
            tracing::info!("Original file deleted after copy: {}", source.display());
            false
        }
        Err(e) => {
            tracing::error!("Failed to delete original file {} after copy: {}", source.display(), e);
            true
        }
    };
    Ok(Relocation { method: MoveMethod::Copied, source_cleanup_failed })
}

/// Renames `source` onto `destination`, falling back to copy + unlink when
/// they sit on different filesystems.
pub(crate) async fn relocate<R, RF, U, UF>(
    source: &Path,
    destination: &Path,
    rename: R,
    unlink: U,
) -> io::Result<Relocation>
where
    R: FnOnce(PathBuf, PathBuf) -> RF,
    RF: Future<Output = io::Result<()>>,
    U: FnOnce(PathBuf) -> UF,
    UF: Future<Output = io::Result<()>>,
{
    match rename(source.to_path_buf(), destination.to_path_buf()).await {
        Ok(()) => Ok(Relocation { method: MoveMethod::Renamed, source_cleanup_failed: false }),
        Err(e) if is_cross_device(&e) => {
            tracing::warn!("Rename of {} crosses filesystems, falling back to copy", source.display());
            copy_then_unlink(source, destination, unlink).await
        }
        Err(e) => Err(e),
    }
}

async fn fs_rename(from: PathBuf, to: PathBuf) -> io::Result<()> {
    tokio::fs::rename(from, to).await
}

async fn fs_unlink(path: PathBuf) -> io::Result<()> {
    tokio::fs::remove_file(path).await
}

fn file_name_of(path: &Path) -> AppResult<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest(format!("source path has no usable file name: {}", path.display())))
}

impl MediaLibrary {
    /// Moves a file from anywhere on the machine into `category`
    /// (`uncategorized` when absent). A file of the same name already in
    /// the category is replaced.
    pub async fn move_in(&self, source: &str, category: Option<&str>) -> AppResult<MoveOutcome> {
        self.move_in_with(source, category, fs_rename, fs_unlink).await
    }

    pub(crate) async fn move_in_with<R, RF, U, UF>(
        &self,
        source: &str,
        category: Option<&str>,
        rename: R,
        unlink: U,
    ) -> AppResult<MoveOutcome>
    where
        R: FnOnce(PathBuf, PathBuf) -> RF,
        RF: Future<Output = io::Result<()>>,
        U: FnOnce(PathBuf) -> UF,
        UF: Future<Output = io::Result<()>>,
    {
        let source = source.trim();
        if source.is_empty() {
            return Err(AppError::BadRequest("No file path provided".into()));
        }
        if source.contains('\0') {
            return Err(AppError::InvalidInput("source path contains null bytes".into()));
        }
        let category = match category.map(str::trim).filter(|c| !c.is_empty()) {
            Some(c) => validate_category_name("category", c)?,
            None => DEFAULT_CATEGORY,
        };

        let source_path = PathBuf::from(source);
        let source_meta = tokio::fs::metadata(&source_path)
            .await
            .map_err(|e| AppError::from_io(e, &format!("source file '{}'", source), "Failed to process file"))?;
        if !source_meta.is_file() {
            return Err(AppError::BadRequest(format!("source is not a regular file: {}", source)));
        }
        let file_name = file_name_of(&source_path)?;

        let target_dir = self.category_path(category);
        tokio::fs::create_dir_all(&target_dir)
            .await
            .map_err(|e| AppError::operation("Failed to process file", e))?;
        let target = target_dir.join(&file_name);

        let relocation = relocate(&source_path, &target, rename, unlink)
            .await
            .map_err(|e| AppError::from_io(e, &format!("source file '{}'", source), "Failed to process file"))?;

        // The file has landed; listings must see it whatever happens next.
        self.metrics.inc_files_moved();
        if relocation.method == MoveMethod::Copied {
            self.metrics.inc_cross_device_copies();
        }
        if relocation.source_cleanup_failed {
            self.metrics.inc_cleanup_failures();
        }
        self.cache.invalidate([category]);
        tracing::info!("File successfully moved: {} -> {}", source, target.display());

        let metadata = tokio::fs::metadata(&target)
            .await
            .map_err(|e| AppError::operation("Failed to process file", e))?;
        Ok(MoveOutcome {
            file: file_record(category, &file_name, &target, &metadata),
            method: relocation.method,
            source_cleanup_failed: relocation.source_cleanup_failed,
        })
    }

    /// Moves `file_name` from one category to another. Both live under the
    /// root, so this is a plain rename; the destination category is created
    /// when missing.
    pub async fn move_between(&self, old_category: &str, new_category: &str, file_name: &str) -> AppResult<FileRecord> {
        let old_category = validate_category_name("oldCategory", old_category)?;
        let new_category = validate_category_name("newCategory", new_category)?;
        let file_name = validate_entry_name("fileName", file_name)?;

        let source = self.category_path(old_category).join(file_name);
        match tokio::fs::symlink_metadata(&source).await {
            Ok(md) if md.is_file() => {}
            Ok(_) => return Err(AppError::BadRequest(format!("'{}' is not a regular file", file_name))),
            Err(e) => {
                return Err(AppError::from_io(
                    e,
                    &format!("file '{}' in category '{}'", file_name, old_category),
                    "Failed to move file",
                ))
            }
        }

        let target_dir = self.category_path(new_category);
        tokio::fs::create_dir_all(&target_dir).await.map_err(|e| AppError::operation("Failed to move file", e))?;
        let target = target_dir.join(file_name);
        tokio::fs::rename(&source, &target).await.map_err(|e| AppError::operation("Failed to move file", e))?;

        self.metrics.inc_files_moved();
        self.cache.invalidate([old_category, new_category]);
        tracing::info!("File moved: {}/{} -> {}/{}", old_category, file_name, new_category, file_name);

        let metadata = tokio::fs::metadata(&target).await.map_err(|e| AppError::operation("Failed to move file", e))?;
        Ok(file_record(new_category, file_name, &target, &metadata))
    }

    pub async fn delete_file(&self, category: &str, name: &str) -> AppResult<()> {
        let category = validate_category_name("category", category)?;
        let name = validate_entry_name("name", name)?;
        let path = self.category_path(category).join(name);
        let subject = format!("file '{}' in category '{}'", name, category);

        match tokio::fs::symlink_metadata(&path).await {
            Ok(md) if md.is_dir() => return Err(AppError::BadRequest(format!("'{}' is a directory", name))),
            Ok(_) => {}
            Err(e) => return Err(AppError::from_io(e, &subject, "Failed to delete file")),
        }
        tokio::fs::remove_file(&path).await.map_err(|e| AppError::from_io(e, &subject, "Failed to delete file"))?;

        self.metrics.inc_files_deleted();
        self.cache.invalidate([category]);
        tracing::info!("File deleted: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::testutil::{library_at, library_root};
    use crate::library::{ListingRequest, PageLimit};
    use tempfile::TempDir;

    fn listing(category: &str) -> ListingRequest {
        ListingRequest { category: category.into(), page: 1, limit: PageLimit::Unlimited }
    }

    #[test]
    fn cross_device_detection_uses_os_code() {
        assert!(is_cross_device(&io::Error::from_raw_os_error(CROSS_DEVICE)));
        assert!(!is_cross_device(&io::Error::new(io::ErrorKind::NotFound, "missing")));
    }

    #[tokio::test]
    async fn move_in_renames_into_default_category() {
        let dir = library_root(&[]);
        let outside = TempDir::new().unwrap();
        let src = outside.path().join("photo.png");
        std::fs::write(&src, b"0123456789").unwrap();
        let lib = library_at(dir.path());

        let outcome = lib.move_in(src.to_str().unwrap(), None).await.unwrap();
        assert_eq!(outcome.file.category, "uncategorized");
        assert_eq!(outcome.file.size, 10);
        assert_eq!(outcome.file.url, "/images/uncategorized/photo.png");
        assert_eq!(outcome.method, MoveMethod::Renamed);
        assert!(!outcome.source_cleanup_failed);
        assert!(!src.exists());
        assert_eq!(std::fs::read(dir.path().join("uncategorized/photo.png")).unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn move_in_creates_category_and_invalidates_its_listing() {
        let dir = library_root(&[]);
        let outside = TempDir::new().unwrap();
        let src = outside.path().join("a.png");
        std::fs::write(&src, b"abc").unwrap();
        let lib = library_at(dir.path());

        assert_eq!(lib.list_files(&listing("cats")).await.unwrap().total_files, 0);
        lib.move_in(src.to_str().unwrap(), Some("cats")).await.unwrap();
        assert_eq!(lib.list_files(&listing("cats")).await.unwrap().total_files, 1);
        assert_eq!(lib.metrics().get_snapshot().files_moved, 1);
    }

    #[tokio::test]
    async fn move_in_rejects_missing_and_non_file_sources() {
        let dir = library_root(&[]);
        let lib = library_at(dir.path());
        let missing = dir.path().join("nope.png");
        assert!(matches!(lib.move_in(missing.to_str().unwrap(), None).await, Err(AppError::NotFound(_))));
        assert!(matches!(lib.move_in("   ", None).await, Err(AppError::BadRequest(_))));
        let folder = dir.path().join("temp");
        assert!(matches!(lib.move_in(folder.to_str().unwrap(), None).await, Err(AppError::BadRequest(_))));
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> =
            std::fs::read_dir(dir).unwrap().map(|e| e.unwrap().file_name().into_string().unwrap()).collect();
        names.sort();
        names
    }

    async fn cross_device(_: PathBuf, _: PathBuf) -> io::Result<()> {
        Err(io::Error::from_raw_os_error(CROSS_DEVICE))
    }

    async fn unlink_denied(_: PathBuf) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::PermissionDenied))
    }

    #[tokio::test]
    async fn copy_fallback_preserves_bytes_and_removes_source() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let src = src_dir.path().join("big.png");
        let payload: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&src, &payload).unwrap();
        let dst = dst_dir.path().join("big.png");

        let relocation = copy_then_unlink(&src, &dst, fs_unlink).await.unwrap();
        assert_eq!(relocation.method, MoveMethod::Copied);
        assert!(!relocation.source_cleanup_failed);
        assert!(!src.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), payload);
        assert_eq!(entries(dst_dir.path()), vec!["big.png"]);
    }

    #[tokio::test]
    async fn failed_copy_leaves_no_destination() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("out.png");
        let err = copy_then_unlink(&dir.path().join("missing.png"), &dst, fs_unlink).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!dst.exists());
        assert!(entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn failed_copy_keeps_existing_destination() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        // A directory cannot be copied; the copy fails before writing.
        let src = src_dir.path().join("shot.png");
        std::fs::create_dir(&src).unwrap();
        let dst = dst_dir.path().join("shot.png");
        std::fs::write(&dst, b"existing library file").unwrap();

        assert!(copy_then_unlink(&src, &dst, fs_unlink).await.is_err());
        assert_eq!(std::fs::read(&dst).unwrap(), b"existing library file");
        assert_eq!(entries(dst_dir.path()), vec!["shot.png"]);
        assert!(src.is_dir());
    }

    #[tokio::test]
    async fn cross_device_move_in_copies_and_counts() {
        let dir = library_root(&[("cats", &[])]);
        let outside = TempDir::new().unwrap();
        let src = outside.path().join("far.png");
        std::fs::write(&src, vec![3u8; 25]).unwrap();
        let lib = library_at(dir.path());
        assert_eq!(lib.list_files(&listing("cats")).await.unwrap().total_files, 0);

        let outcome = lib.move_in_with(src.to_str().unwrap(), Some("cats"), cross_device, fs_unlink).await.unwrap();
        assert_eq!(outcome.method, MoveMethod::Copied);
        assert_eq!(outcome.file.size, 25);
        assert!(!outcome.source_cleanup_failed);
        assert!(!src.exists());
        assert_eq!(std::fs::read(dir.path().join("cats/far.png")).unwrap(), vec![3u8; 25]);
        assert_eq!(lib.list_files(&listing("cats")).await.unwrap().total_files, 1);

        let snap = lib.metrics().get_snapshot();
        assert_eq!(snap.cross_device_copies, 1);
        assert_eq!(snap.cleanup_failures, 0);
    }

    #[tokio::test]
    async fn failed_source_cleanup_is_flagged_not_fatal() {
        let dir = library_root(&[]);
        let outside = TempDir::new().unwrap();
        let src = outside.path().join("stuck.png");
        std::fs::write(&src, b"abcd").unwrap();
        let lib = library_at(dir.path());

        let outcome = lib.move_in_with(src.to_str().unwrap(), None, cross_device, unlink_denied).await.unwrap();
        assert_eq!(outcome.method, MoveMethod::Copied);
        assert!(outcome.source_cleanup_failed);
        assert_eq!(outcome.file.size, 4);
        assert!(src.exists());
        assert!(dir.path().join("uncategorized/stuck.png").is_file());

        let snap = lib.metrics().get_snapshot();
        assert_eq!(snap.cleanup_failures, 1);
        assert_eq!(snap.files_moved, 1);
    }

    #[tokio::test]
    async fn other_rename_errors_are_not_retried_as_copies() {
        let dir = library_root(&[]);
        let outside = TempDir::new().unwrap();
        let src = outside.path().join("locked.png");
        std::fs::write(&src, b"x").unwrap();
        let lib = library_at(dir.path());

        let denied = |_: PathBuf, _: PathBuf| async { Err::<(), _>(io::Error::from(io::ErrorKind::PermissionDenied)) };
        let result = lib.move_in_with(src.to_str().unwrap(), None, denied, fs_unlink).await;
        assert!(matches!(result, Err(AppError::PermissionDenied(_))));
        assert!(src.exists());
        assert!(!dir.path().join("uncategorized/locked.png").exists());
        assert_eq!(lib.metrics().get_snapshot().files_moved, 0);
    }

    #[tokio::test]
    async fn listing_is_invalidated_even_if_the_moved_file_cannot_be_stat() {
        let dir = library_root(&[("cats", &[])]);
        let outside = TempDir::new().unwrap();
        let src = outside.path().join("gone.png");
        std::fs::write(&src, b"x").unwrap();
        let lib = library_at(dir.path());
        let request = listing("cats");
        lib.list_files(&request).await.unwrap();
        assert!(lib.cache().contains(&request.cache_key()));

        // Reports success without placing the file, so the stat that follows fails.
        let vanished = |_: PathBuf, _: PathBuf| async { Ok::<(), io::Error>(()) };
        let result = lib.move_in_with(src.to_str().unwrap(), Some("cats"), vanished, fs_unlink).await;
        assert!(matches!(result, Err(AppError::Operation { .. })));
        assert!(!lib.cache().contains(&request.cache_key()));
    }

    #[tokio::test]
    async fn move_between_updates_both_listings() {
        let dir = library_root(&[("a", &[("x.png", 10)]), ("b", &[])]);
        let lib = library_at(dir.path());
        assert_eq!(lib.list_files(&listing("a")).await.unwrap().total_files, 1);
        assert_eq!(lib.list_files(&listing("b")).await.unwrap().total_files, 0);

        let record = lib.move_between("a", "b", "x.png").await.unwrap();
        assert_eq!(record.category, "b");
        assert_eq!(record.size, 10);

        assert_eq!(lib.list_files(&listing("a")).await.unwrap().total_files, 0);
        let b = lib.list_files(&listing("b")).await.unwrap();
        assert_eq!(b.files.len(), 1);
        assert_eq!(b.files[0].name, "x.png");
        assert_eq!(std::fs::read(dir.path().join("b/x.png")).unwrap(), vec![b'x'; 10]);
    }

    #[tokio::test]
    async fn move_between_creates_destination_and_reports_missing_source() {
        let dir = library_root(&[("a", &[("x.png", 1)])]);
        let lib = library_at(dir.path());
        lib.move_between("a", "fresh", "x.png").await.unwrap();
        assert!(dir.path().join("fresh/x.png").is_file());
        assert!(matches!(lib.move_between("a", "fresh", "x.png").await, Err(AppError::NotFound(_))));
        assert!(matches!(
            lib.move_between("a", "fresh", "../x.png").await,
            Err(AppError::ValidationError { .. })
        ));
    }

    #[tokio::test]
    async fn delete_file_removes_and_invalidates() {
        let dir = library_root(&[("a", &[("x.png", 3), ("y.png", 4)])]);
        let lib = library_at(dir.path());
        assert_eq!(lib.library_stats().await.unwrap().storage_used, 7);

        lib.delete_file("a", "x.png").await.unwrap();
        assert_eq!(lib.library_stats().await.unwrap().storage_used, 4);
        assert_eq!(lib.list_files(&listing("a")).await.unwrap().total_files, 1);
        assert!(matches!(lib.delete_file("a", "x.png").await, Err(AppError::NotFound(_))));
    }
}
