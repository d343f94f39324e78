use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use tokio::sync::Semaphore;

/// Total size and number of regular files below a directory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DirStats {
    pub size: u64,
    pub count: u32,
}

impl DirStats {
    pub fn merge(&mut self, other: DirStats) {
        self.size = self.size.saturating_add(other.size);
        self.count = self.count.saturating_add(other.count);
    }
}

/// Recursive size/count aggregation.
///
/// Subdirectories are walked concurrently. One semaphore, shared by every
/// walk running in the process, caps how many directories are open at the
/// same time. A permit covers reading a single directory and is released
/// before its children are visited.
#[derive(Clone)]
pub struct StatsAggregator {
    permits: Arc<Semaphore>,
    max_open_dirs: usize,
}

impl StatsAggregator {
    pub fn new(max_open_dirs: usize) -> Self {
        let max_open_dirs = max_open_dirs.max(1);
        Self { permits: Arc::new(Semaphore::new(max_open_dirs)), max_open_dirs }
    }

    pub fn max_open_dirs(&self) -> usize {
        self.max_open_dirs
    }

    /// Aggregates everything below `path`. Symlinks and special files are
    /// ignored; entries that vanish mid-walk are skipped.
    pub async fn stats(&self, path: &Path) -> io::Result<DirStats> {
        self.walk(path.to_path_buf(), true).await
    }

    // Only the root must exist; a subdirectory removed after its parent was
    // listed contributes nothing.
    fn walk(&self, dir: PathBuf, root: bool) -> BoxFuture<'_, io::Result<DirStats>> {
        async move {
            let (mut stats, subdirs) = match self.read_level(&dir).await {
                Ok(level) => level,
                Err(e) if !root && e.kind() == io::ErrorKind::NotFound => return Ok(DirStats::default()),
                Err(e) => return Err(e),
            };
            for child in try_join_all(subdirs.into_iter().map(|sub| self.walk(sub, false))).await? {
                stats.merge(child);
            }
            Ok(stats)
        }
        .boxed()
    }

    async fn read_level(&self, dir: &Path) -> io::Result<(DirStats, Vec<PathBuf>)> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| io::Error::other("directory aggregator shut down"))?;

        let mut stats = DirStats::default();
        let mut subdirs = Vec::new();
        let mut rd = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = rd.next_entry().await? {
            let file_type = match entry.file_type().await {
                Ok(ft) => ft,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            if file_type.is_file() {
                match entry.metadata().await {
                    Ok(md) => stats.merge(DirStats { size: md.len(), count: 1 }),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(e),
                }
            } else if file_type.is_dir() {
                subdirs.push(entry.path());
            }
        }
        Ok((stats, subdirs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let base = dir.path();
        fs::create_dir_all(base.join("a/b/c")).unwrap();
        fs::create_dir_all(base.join("d")).unwrap();
        fs::write(base.join("top.bin"), vec![0u8; 5]).unwrap();
        fs::write(base.join("a/one.bin"), vec![0u8; 10]).unwrap();
        fs::write(base.join("a/b/two.bin"), vec![0u8; 20]).unwrap();
        fs::write(base.join("a/b/c/three.bin"), vec![0u8; 40]).unwrap();
        fs::write(base.join("d/four.bin"), vec![0u8; 80]).unwrap();
        dir
    }

    #[tokio::test]
    async fn sums_nested_files() {
        let dir = tree();
        let stats = StatsAggregator::new(4).stats(dir.path()).await.unwrap();
        assert_eq!(stats, DirStats { size: 155, count: 5 });
    }

    #[tokio::test]
    async fn empty_directory_is_zero() {
        let dir = TempDir::new().unwrap();
        let stats = StatsAggregator::new(4).stats(dir.path()).await.unwrap();
        assert_eq!(stats, DirStats::default());
    }

    #[tokio::test]
    async fn single_permit_still_completes_deep_and_wide_trees() {
        let dir = TempDir::new().unwrap();
        for i in 0..8 {
            let deep = dir.path().join(format!("w{}", i)).join("x/y/z");
            fs::create_dir_all(&deep).unwrap();
            fs::write(deep.join("f"), vec![1u8; 3]).unwrap();
        }
        let stats = StatsAggregator::new(1).stats(dir.path()).await.unwrap();
        assert_eq!(stats, DirStats { size: 24, count: 8 });
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = StatsAggregator::new(2).stats(&dir.path().join("nope")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn vanished_subdirectory_counts_as_empty() {
        let dir = tree();
        let agg = StatsAggregator::new(2);
        let gone = dir.path().join("a/removed");
        assert_eq!(agg.walk(gone.clone(), false).await.unwrap(), DirStats::default());
        assert_eq!(agg.walk(gone, true).await.unwrap_err().kind(), io::ErrorKind::NotFound);
        assert_eq!(agg.stats(dir.path()).await.unwrap(), DirStats { size: 155, count: 5 });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_are_not_followed() {
        let dir = tree();
        std::os::unix::fs::symlink(dir.path().join("a"), dir.path().join("again")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("top.bin"), dir.path().join("top.lnk")).unwrap();
        let stats = StatsAggregator::new(4).stats(dir.path()).await.unwrap();
        assert_eq!(stats, DirStats { size: 155, count: 5 });
    }

    #[test]
    fn zero_permits_are_raised_to_one() {
        assert_eq!(StatsAggregator::new(0).max_open_dirs(), 1);
    }
}
