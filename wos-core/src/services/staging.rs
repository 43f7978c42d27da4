//! Staging directories
//!
//! Every ingestion works inside a private, uniquely named directory under the
//! configured upload temp root. Archive and index-document ingestion hold a
//! [`StagingDir`] guard that removes the directory when dropped; batch
//! sessions detach the guard with [`StagingDir::keep`] and destroy the
//! directory explicitly at finalize.

use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use wos_common::{Error, Result};

const STAGING_PREFIX: &str = "stage-";

/// Root under which staging directories are created
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

/// Owned staging directory, removed on drop unless kept
#[derive(Debug)]
pub struct StagingDir {
    inner: TempDir,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, empty, uniquely named directory
    pub fn create(&self) -> Result<StagingDir> {
        std::fs::create_dir_all(&self.root).map_err(|e| {
            Error::Resource(format!(
                "cannot create staging root {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let inner = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.root)
            .map_err(|e| {
                Error::Resource(format!(
                    "cannot create staging directory in {}: {}",
                    self.root.display(),
                    e
                ))
            })?;

        debug!(path = %inner.path().display(), "Created staging directory");
        Ok(StagingDir { inner })
    }

    /// Remove a staging directory and everything under it
    ///
    /// Idempotent: a path that no longer exists (or never existed) succeeds.
    /// Paths outside the staging root are refused.
    pub fn destroy(&self, path: &Path) -> Result<()> {
        if !path.starts_with(&self.root) || path == self.root {
            return Err(Error::Resource(format!(
                "refusing to remove {} outside staging root {}",
                path.display(),
                self.root.display()
            )));
        }

        match std::fs::remove_dir_all(path) {
            Ok(()) => {
                debug!(path = %path.display(), "Removed staging directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Resource(format!(
                "cannot remove staging directory {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// [`StagingArea::destroy`] on the blocking pool
    pub async fn destroy_async(&self, path: &Path) -> Result<()> {
        let area = self.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || area.destroy(&path))
            .await
            .map_err(|e| Error::Internal(format!("staging cleanup task failed: {}", e)))?
    }
}

impl StagingDir {
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Detach the guard; the caller becomes responsible for removal
    pub fn keep(self) -> PathBuf {
        self.inner.keep()
    }
}

/// Normalize a client-supplied relative path
///
/// Rejects any `..` segment and platform prefixes. A leading root is
/// stripped when `strip_root` is set and rejected otherwise. `.` segments
/// are dropped. The result is never empty.
pub fn normalize_relative_path(path: &Path, strip_root: bool) -> Result<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::RootDir if strip_root => {}
            Component::RootDir => {
                return Err(Error::Validation(format!(
                    "absolute path not allowed: {}",
                    path.display()
                )));
            }
            Component::ParentDir => {
                return Err(Error::Validation(format!(
                    "parent directory segment not allowed: {}",
                    path.display()
                )));
            }
            Component::Prefix(_) => {
                return Err(Error::Validation(format!(
                    "path prefix not allowed: {}",
                    path.display()
                )));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(Error::Validation(format!(
            "empty path: {:?}",
            path.display().to_string()
        )));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_returns_distinct_empty_directories() {
        let root = TempDir::new().unwrap();
        let area = StagingArea::new(root.path());

        let a = area.create().unwrap();
        let b = area.create().unwrap();

        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(root.path()));
        assert_eq!(std::fs::read_dir(a.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_guard_removes_directory_on_drop() {
        let root = TempDir::new().unwrap();
        let area = StagingArea::new(root.path());

        let dir = area.create().unwrap();
        let path = dir.path().to_path_buf();
        std::fs::write(path.join("file.txt"), b"data").unwrap();
        drop(dir);

        assert!(!path.exists());
    }

    #[test]
    fn test_kept_directory_survives_until_destroyed() {
        let root = TempDir::new().unwrap();
        let area = StagingArea::new(root.path());

        let path = area.create().unwrap().keep();
        assert!(path.exists());

        std::fs::create_dir_all(path.join("nested/deeper")).unwrap();
        std::fs::write(path.join("nested/deeper/x"), b"x").unwrap();

        area.destroy(&path).unwrap();
        assert!(!path.exists());
        // Second destroy is a no-op
        area.destroy(&path).unwrap();
        // Never-created path under the root is a no-op as well
        area.destroy(&root.path().join("stage-never")).unwrap();
    }

    #[test]
    fn test_destroy_refuses_paths_outside_root() {
        let root = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let area = StagingArea::new(root.path());

        assert!(matches!(area.destroy(outside.path()), Err(Error::Resource(_))));
        assert!(matches!(area.destroy(root.path()), Err(Error::Resource(_))));
        assert!(outside.path().exists());
    }

    #[test]
    fn test_create_fails_when_root_is_a_file() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("not-a-dir");
        std::fs::write(&file, b"").unwrap();

        let area = StagingArea::new(&file);
        assert!(matches!(area.create(), Err(Error::Resource(_))));
    }

    #[test]
    fn test_normalize_relative_path() {
        assert_eq!(
            normalize_relative_path(Path::new("a/./b.txt"), false).unwrap(),
            PathBuf::from("a/b.txt")
        );
        assert_eq!(
            normalize_relative_path(Path::new("/index.json"), true).unwrap(),
            PathBuf::from("index.json")
        );
        assert!(normalize_relative_path(Path::new("/index.json"), false).is_err());
        assert!(normalize_relative_path(Path::new("../escape"), true).is_err());
        assert!(normalize_relative_path(Path::new("a/../../b"), true).is_err());
        assert!(normalize_relative_path(Path::new("/"), true).is_err());
        assert!(normalize_relative_path(Path::new(""), true).is_err());
    }
}
