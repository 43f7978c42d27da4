//! Content-addressed store
//!
//! The CID of a tree is the hex SHA-256 of a canonical walk over it: entries
//! sorted by path, each directory contributing `D\0<path>\0` and each file
//! `F\0<path>\0<len as u64 le>` followed by its bytes. Ingesting identical
//! trees therefore always yields the same CID.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;
use walkdir::WalkDir;
use wos_common::{Error, Result};

use crate::models::Cid;

/// Immutable content-addressed storage of object trees
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store the tree rooted at `dir` and return its CID
    async fn put(&self, dir: &Path) -> Result<Cid>;

    /// Materialize the tree for `cid` into `dir`
    async fn get(&self, cid: &Cid, dir: &Path) -> Result<()>;
}

/// Filesystem-backed content store keeping one directory per CID
#[derive(Debug, Clone)]
pub struct LocalContentStore {
    root: PathBuf,
}

impl LocalContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn put_blocking(&self, dir: &Path) -> Result<Cid> {
        let cid = tree_digest(dir)?;
        let target = self.root.join(cid.as_str());
        if target.exists() {
            debug!(cid = %cid, "Content already stored");
            return Ok(cid);
        }

        std::fs::create_dir_all(&self.root).map_err(store_err("create content root"))?;
        let incoming = self.root.join(format!(".incoming-{}", Uuid::new_v4()));
        if let Err(e) = copy_tree(dir, &incoming) {
            let _ = std::fs::remove_dir_all(&incoming);
            return Err(e);
        }

        // A concurrent put of the same tree may have won the rename
        if let Err(e) = std::fs::rename(&incoming, &target) {
            let _ = std::fs::remove_dir_all(&incoming);
            if !target.exists() {
                return Err(Error::Store(format!(
                    "cannot commit content {}: {}",
                    cid, e
                )));
            }
        }

        info!(cid = %cid, "Stored content");
        Ok(cid)
    }

    fn get_blocking(&self, cid: &Cid, dir: &Path) -> Result<()> {
        let source = self.root.join(cid.as_str());
        if !source.is_dir() {
            return Err(Error::NotFound(format!("content {}", cid)));
        }
        copy_tree(&source, dir)
    }
}

#[async_trait]
impl ContentStore for LocalContentStore {
    async fn put(&self, dir: &Path) -> Result<Cid> {
        let store = self.clone();
        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || store.put_blocking(&dir))
            .await
            .map_err(|e| Error::Internal(format!("content store task failed: {}", e)))?
    }

    async fn get(&self, cid: &Cid, dir: &Path) -> Result<()> {
        let store = self.clone();
        let cid = cid.clone();
        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || store.get_blocking(&cid, &dir))
            .await
            .map_err(|e| Error::Internal(format!("content store task failed: {}", e)))?
    }
}

/// Compute the CID of the tree rooted at `dir`
pub fn tree_digest(dir: &Path) -> Result<Cid> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Store(format!("cannot walk {}: {}", dir.display(), e)))?;
        let relative = relative_key(dir, entry.path())?;
        let file_type = entry.file_type();

        if file_type.is_dir() {
            hasher.update(b"D\0");
            hasher.update(relative.as_bytes());
            hasher.update(b"\0");
        } else if file_type.is_file() {
            let mut file = File::open(entry.path()).map_err(store_err("open file"))?;
            let len = file.metadata().map_err(store_err("stat file"))?.len();
            hasher.update(b"F\0");
            hasher.update(relative.as_bytes());
            hasher.update(b"\0");
            hasher.update(len.to_le_bytes());
            loop {
                let n = file.read(&mut buffer).map_err(store_err("read file"))?;
                if n == 0 {
                    break;
                }
                hasher.update(&buffer[..n]);
            }
        } else {
            return Err(Error::Validation(format!(
                "unsupported file type in object tree: {}",
                relative
            )));
        }
    }

    Cid::parse(&format!("{:x}", hasher.finalize()))
}

/// Forward-slash relative path of `path` under `root`
pub fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| Error::Internal(format!("{} escaped {}", path.display(), root.display())))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        let part = component.as_os_str().to_str().ok_or_else(|| {
            Error::Validation(format!("non UTF-8 path: {}", relative.display()))
        })?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}

/// Recursively copy regular files and directories from `src` into `dst`
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst).map_err(store_err("create directory"))?;
    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Store(format!("cannot walk {}: {}", src.display(), e)))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| Error::Internal("walk escaped its root".to_string()))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(store_err("create directory"))?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target).map_err(store_err("copy file"))?;
        } else {
            return Err(Error::Validation(format!(
                "unsupported file type in object tree: {}",
                relative.display()
            )));
        }
    }
    Ok(())
}

fn store_err(action: &'static str) -> impl Fn(std::io::Error) -> Error {
    move |e| Error::Store(format!("{}: {}", action, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
        for (path, content) in files {
            let full = root.join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
    }

    #[test]
    fn test_digest_is_deterministic() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let files: &[(&str, &[u8])] = &[("index.json", b"{}"), ("media/photo.bin", b"\x01\x02")];
        write_tree(a.path(), files);
        write_tree(b.path(), files);

        assert_eq!(tree_digest(a.path()).unwrap(), tree_digest(b.path()).unwrap());
    }

    #[test]
    fn test_digest_depends_on_content_and_layout() {
        let base = TempDir::new().unwrap();
        write_tree(base.path(), &[("index.json", b"{}"), ("a.txt", b"hello")]);

        let changed = TempDir::new().unwrap();
        write_tree(changed.path(), &[("index.json", b"{}"), ("a.txt", b"hellp")]);

        let moved = TempDir::new().unwrap();
        write_tree(moved.path(), &[("index.json", b"{}"), ("sub/a.txt", b"hello")]);

        let base_cid = tree_digest(base.path()).unwrap();
        assert_ne!(base_cid, tree_digest(changed.path()).unwrap());
        assert_ne!(base_cid, tree_digest(moved.path()).unwrap());
        assert_eq!(base_cid.as_str().len(), 64);
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let root = TempDir::new().unwrap();
        let store = LocalContentStore::new(root.path().join("content"));

        let source = TempDir::new().unwrap();
        write_tree(source.path(), &[("index.json", b"{\"a\":1}"), ("img/x.png", b"png")]);

        let cid = store.put(source.path()).await.unwrap();
        let again = store.put(source.path()).await.unwrap();
        assert_eq!(cid, again);

        let out = TempDir::new().unwrap();
        store.get(&cid, out.path()).await.unwrap();
        assert_eq!(std::fs::read(out.path().join("index.json")).unwrap(), b"{\"a\":1}");
        assert_eq!(std::fs::read(out.path().join("img/x.png")).unwrap(), b"png");
    }

    #[tokio::test]
    async fn test_get_unknown_cid_is_not_found() {
        let root = TempDir::new().unwrap();
        let store = LocalContentStore::new(root.path());
        let out = TempDir::new().unwrap();

        let result = store.get(&Cid::parse("unknown").unwrap(), out.path()).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_digest_rejects_symlinks() {
        let dir = TempDir::new().unwrap();
        write_tree(dir.path(), &[("index.json", b"{}")]);
        std::os::unix::fs::symlink("/etc/passwd", dir.path().join("link")).unwrap();

        assert!(matches!(tree_digest(dir.path()), Err(Error::Validation(_))));
    }
}
