//! Mapping content filenames to local paths.
//!
//! The rest of the crate only sees the [`ContentPathResolver`] trait. The
//! bundled [`ContentStorage`] implements the sharded on-disk layout used for
//! content files:
//!
//! ```text
//! <content_dir>/a/b/ab12cd34....zip
//!               ^ ^
//!               │ └ second character of the filename
//!               └── first character of the filename
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Resolves a content filename to a local file.
///
/// Implementations return `None` when the filename does not name an existing
/// regular file. Callers treat `None` as "does not exist locally".
#[async_trait]
pub trait ContentPathResolver: Send + Sync {
    /// Returns the absolute path for `filename`, if it exists.
    async fn resolve(&self, filename: &str) -> Option<PathBuf>;
}

/// Content files stored under a sharded directory tree.
#[derive(Debug, Clone)]
pub struct ContentStorage {
    root: PathBuf,
}

impl ContentStorage {
    /// Creates a resolver rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Computes where `filename` would live, without touching the filesystem.
    ///
    /// Returns `None` for names that cannot be content filenames: shorter than
    /// two characters, containing a path separator, or a relative component.
    pub fn path_for(&self, filename: &str) -> Option<PathBuf> {
        if filename == "." || filename == ".." {
            return None;
        }
        if filename.contains(['/', '\\', '\0']) {
            return None;
        }

        let mut chars = filename.chars();
        let first = chars.next()?;
        let second = chars.next()?;
        if first == '.' && second == '.' {
            return None;
        }

        Some(
            self.root
                .join(first.to_string())
                .join(second.to_string())
                .join(filename),
        )
    }
}

#[async_trait]
impl ContentPathResolver for ContentStorage {
    async fn resolve(&self, filename: &str) -> Option<PathBuf> {
        let path = self.path_for(filename)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            Ok(_) => {
                tracing::debug!(path = %path.display(), "content path is not a regular file");
                None
            }
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_path_for_shards_by_first_two_characters() {
        let storage = ContentStorage::new("/srv/content");
        assert_eq!(
            storage.path_for("ab12.zip"),
            Some(PathBuf::from("/srv/content/a/b/ab12.zip"))
        );
    }

    #[test]
    fn test_path_for_rejects_unsafe_names() {
        let storage = ContentStorage::new("/srv/content");
        assert!(storage.path_for("").is_none());
        assert!(storage.path_for("a").is_none());
        assert!(storage.path_for(".").is_none());
        assert!(storage.path_for("..").is_none());
        assert!(storage.path_for("../etc").is_none());
        assert!(storage.path_for("ab/cd.zip").is_none());
        assert!(storage.path_for("ab\\cd.zip").is_none());
        assert!(storage.path_for("..hidden").is_none());
    }

    #[tokio::test]
    async fn test_resolve_existing_file() {
        let dir = TempDir::new().unwrap();
        let shard = dir.path().join("c").join("d");
        fs::create_dir_all(&shard).unwrap();
        fs::write(shard.join("cdef.zip"), b"PK").unwrap();

        let storage = ContentStorage::new(dir.path());
        assert_eq!(
            storage.resolve("cdef.zip").await,
            Some(shard.join("cdef.zip"))
        );
    }

    #[tokio::test]
    async fn test_resolve_missing_file() {
        let dir = TempDir::new().unwrap();
        let storage = ContentStorage::new(dir.path());
        assert!(storage.resolve("cdef.zip").await.is_none());
    }

    #[tokio::test]
    async fn test_resolve_directory_is_not_content() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("c").join("d").join("cdef.zip")).unwrap();

        let storage = ContentStorage::new(dir.path());
        assert!(storage.resolve("cdef.zip").await.is_none());
    }
}
