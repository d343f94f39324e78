use std::io;

use futures::future::try_join_all;

use super::{category_names, validate_category_name, MediaLibrary};
use crate::cache::{CacheTag, CATEGORIES_KEY, STATS_KEY};
use crate::error::{AppError, AppResult};
use crate::types::{CategorySummary, LibraryStats};

impl MediaLibrary {
    /// Every category with its recursive file count and size.
    pub async fn category_summaries(&self) -> AppResult<Vec<CategorySummary>> {
        self.cache
            .get_or_compute(CATEGORIES_KEY, vec![CacheTag::Aggregate], || async {
                self.compute_summaries().await.map_err(|e| AppError::operation("Error reading categories", e))
            })
            .await
    }

    async fn compute_summaries(&self) -> io::Result<Vec<CategorySummary>> {
        let root = self.root();
        let names = category_names(&root).await?;
        let walks = names.into_iter().map(|name| {
            let dir = root.join(&name);
            async move {
                let stats = self.aggregator.stats(&dir).await?;
                Ok::<_, io::Error>(CategorySummary { name, file_count: stats.count, size: stats.size })
            }
        });
        try_join_all(walks).await
    }

    /// Library-wide totals. Summed from the per-category aggregates, so
    /// loose files in the root and anything under `temp` are not counted.
    pub async fn library_stats(&self) -> AppResult<LibraryStats> {
        self.cache
            .get_or_compute(STATS_KEY, vec![CacheTag::Aggregate], || async {
                let summaries = self.category_summaries().await.map_err(|e| match e {
                    AppError::Operation { source, .. } => AppError::operation("Error getting stats", source),
                    other => other,
                })?;
                Ok(LibraryStats {
                    total_images: summaries.iter().fold(0u32, |acc, c| acc.saturating_add(c.file_count)),
                    categories: summaries.len() as u32,
                    storage_used: summaries.iter().fold(0u64, |acc, c| acc.saturating_add(c.size)),
                })
            })
            .await
    }

    pub async fn create_category(&self, name: &str) -> AppResult<()> {
        let name = validate_category_name("name", name)?;
        let path = self.category_path(name);
        tokio::fs::create_dir(&path)
            .await
            .map_err(|e| AppError::from_io(e, &format!("category '{}'", name), "Failed to create category"))?;

        self.cache.invalidate([name]);
        self.metrics.inc_category_mutations();
        tracing::info!("Category created: {}", name);
        Ok(())
    }

    /// Renames a category directory in place. Refuses to replace an
    /// existing category.
    pub async fn rename_category(&self, old_name: &str, new_name: &str) -> AppResult<()> {
        let old_name = validate_category_name("oldName", old_name)?;
        let new_name = validate_category_name("newName", new_name)?;
        let old_path = self.category_path(old_name);
        let new_path = self.category_path(new_name);

        match tokio::fs::metadata(&old_path).await {
            Ok(md) if md.is_dir() => {}
            Ok(_) => return Err(AppError::NotFound(format!("category '{}' not found", old_name))),
            Err(e) => return Err(AppError::from_io(e, &format!("category '{}'", old_name), "Failed to rename category")),
        }
        if old_name == new_name {
            return Ok(());
        }
        if tokio::fs::try_exists(&new_path)
            .await
            .map_err(|e| AppError::operation("Failed to rename category", e))?
        {
            return Err(AppError::Conflict(format!("category '{}' already exists", new_name)));
        }

        tokio::fs::rename(&old_path, &new_path)
            .await
            .map_err(|e| AppError::from_io(e, &format!("category '{}'", old_name), "Failed to rename category"))?;

        self.cache.invalidate([old_name, new_name]);
        self.metrics.inc_category_mutations();
        tracing::info!("Category renamed: {} -> {}", old_name, new_name);
        Ok(())
    }

    /// Removes a category and everything in it, empty or not.
    pub async fn delete_category(&self, name: &str) -> AppResult<()> {
        let name = validate_category_name("name", name)?;
        let path = self.category_path(name);

        match tokio::fs::symlink_metadata(&path).await {
            Ok(md) if md.is_dir() => {}
            Ok(_) => return Err(AppError::NotFound(format!("category '{}' not found", name))),
            Err(e) => return Err(AppError::from_io(e, &format!("category '{}'", name), "Failed to delete category")),
        }
        tokio::fs::remove_dir_all(&path)
            .await
            .map_err(|e| AppError::from_io(e, &format!("category '{}'", name), "Failed to delete category"))?;

        self.cache.invalidate([name]);
        self.metrics.inc_category_mutations();
        tracing::info!("Category deleted: {}", name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::testutil::{library_at, library_root};

    async fn names(lib: &MediaLibrary) -> Vec<String> {
        let mut names: Vec<String> =
            lib.category_summaries().await.unwrap().into_iter().map(|c| c.name).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn summaries_exclude_temp_and_count_recursively() {
        let dir = library_root(&[("a", &[("x.png", 10)]), ("b", &[])]);
        std::fs::create_dir(dir.path().join("a/sub")).unwrap();
        std::fs::write(dir.path().join("a/sub/y.png"), vec![0u8; 5]).unwrap();
        std::fs::write(dir.path().join("temp/t.png"), vec![0u8; 99]).unwrap();
        let lib = library_at(dir.path());

        let mut summaries = lib.category_summaries().await.unwrap();
        summaries.sort_by(|l, r| l.name.cmp(&r.name));
        assert_eq!(
            summaries,
            vec![
                CategorySummary { name: "a".into(), file_count: 2, size: 15 },
                CategorySummary { name: "b".into(), file_count: 0, size: 0 },
            ]
        );
    }

    #[tokio::test]
    async fn stats_sum_the_categories_and_are_stable() {
        let dir = library_root(&[("a", &[("x.png", 10), ("y.png", 4)]), ("b", &[("z.png", 6)])]);
        std::fs::write(dir.path().join("loose.png"), vec![0u8; 1000]).unwrap();
        std::fs::write(dir.path().join("temp/t.png"), vec![0u8; 1000]).unwrap();
        let lib = library_at(dir.path());

        let first = lib.library_stats().await.unwrap();
        assert_eq!(first, LibraryStats { total_images: 3, categories: 2, storage_used: 20 });
        let summed: u64 = lib.category_summaries().await.unwrap().iter().map(|c| c.size).sum();
        assert_eq!(first.storage_used, summed);
        assert_eq!(lib.library_stats().await.unwrap(), first);
    }

    #[tokio::test]
    async fn create_rename_delete_scenario() {
        let dir = library_root(&[("a", &[("x.png", 10)]), ("b", &[])]);
        let lib = library_at(dir.path());
        assert_eq!(names(&lib).await, vec!["a", "b"]);

        lib.create_category("c").await.unwrap();
        assert_eq!(names(&lib).await, vec!["a", "b", "c"]);

        lib.rename_category("a", "a2").await.unwrap();
        assert_eq!(names(&lib).await, vec!["a2", "b", "c"]);
        assert!(dir.path().join("a2/x.png").is_file());

        lib.delete_category("b").await.unwrap();
        assert_eq!(names(&lib).await, vec!["a2", "c"]);

        // Non-empty categories are removed recursively.
        lib.delete_category("a2").await.unwrap();
        assert_eq!(names(&lib).await, vec!["c"]);
        assert_eq!(lib.library_stats().await.unwrap().storage_used, 0);
    }

    #[tokio::test]
    async fn create_existing_is_conflict() {
        let dir = library_root(&[("a", &[])]);
        let lib = library_at(dir.path());
        assert!(matches!(lib.create_category("a").await, Err(AppError::Conflict(_))));
        assert!(matches!(lib.create_category("temp").await, Err(AppError::ValidationError { .. })));
        assert!(matches!(lib.create_category("../escape").await, Err(AppError::ValidationError { .. })));
    }

    #[tokio::test]
    async fn rename_checks_both_ends() {
        let dir = library_root(&[("a", &[]), ("b", &[])]);
        let lib = library_at(dir.path());
        assert!(matches!(lib.rename_category("missing", "z").await, Err(AppError::NotFound(_))));
        assert!(matches!(lib.rename_category("a", "b").await, Err(AppError::Conflict(_))));
        assert!(matches!(lib.rename_category("a", "temp").await, Err(AppError::ValidationError { .. })));
        assert!(dir.path().join("a").is_dir());
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let dir = library_root(&[]);
        let lib = library_at(dir.path());
        assert!(matches!(lib.delete_category("nope").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn mutations_invalidate_aggregates() {
        let dir = library_root(&[("a", &[("x.png", 10)])]);
        let lib = library_at(dir.path());
        assert_eq!(lib.library_stats().await.unwrap().categories, 1);
        assert!(lib.cache().contains(STATS_KEY));

        lib.create_category("b").await.unwrap();
        assert!(!lib.cache().contains(STATS_KEY));
        assert!(!lib.cache().contains(CATEGORIES_KEY));
        assert_eq!(lib.library_stats().await.unwrap().categories, 2);
    }
}
