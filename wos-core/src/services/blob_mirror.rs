//! Blob mirror
//!
//! Mirrors every file of a committed object tree into an object store,
//! keyed `<prefix>/<cid>/<relative path>`. The backend comes from the
//! configured URL; `s3://` picks up `AWS_*` environment variables.

use async_trait::async_trait;
use object_store::aws::AmazonS3ConfigKey;
use object_store::path::Path as ObjectPath;
use object_store::{parse_url, parse_url_opts, ObjectStore, ObjectStoreScheme, PutPayload};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;
use walkdir::WalkDir;
use wos_common::{Error, Result};

use super::content_store::relative_key;
use crate::models::Cid;

#[async_trait]
pub trait BlobMirror: Send + Sync {
    /// Upload every regular file under `dir` beneath `cid`
    async fn put(&self, cid: &Cid, dir: &Path) -> Result<usize>;
}

#[derive(Clone)]
pub struct ObjectStoreMirror {
    store: Arc<dyn ObjectStore>,
    prefix: ObjectPath,
}

impl ObjectStoreMirror {
    pub fn from_url(url_str: &str) -> Result<Self> {
        let url: Url = url_str
            .parse()
            .map_err(|e| Error::Config(format!("invalid blob mirror url {}: {}", url_str, e)))?;
        let (scheme, _) = ObjectStoreScheme::parse(&url)
            .map_err(|e| Error::Config(format!("unsupported blob mirror url {}: {}", url_str, e)))?;

        let (store, prefix) = match scheme {
            ObjectStoreScheme::AmazonS3 => parse_url_opts(&url, aws_env_options()),
            _ => parse_url(&url),
        }
        .map_err(|e| Error::Config(format!("cannot open blob mirror {}: {}", url_str, e)))?;

        info!(url = url_str, "Blob mirror configured");
        Ok(Self {
            store: Arc::from(store),
            prefix,
        })
    }

    pub fn from_store(store: Arc<dyn ObjectStore>, prefix: ObjectPath) -> Self {
        Self { store, prefix }
    }

    /// Object key of `relative` (forward-slash separated) inside `cid`
    pub fn object_path(&self, cid: &Cid, relative: &str) -> ObjectPath {
        relative
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(self.prefix.child(cid.as_str()), |path, part| path.child(part))
    }
}

/// `AWS_*` variables as S3 options so explicit keys win over instance metadata
fn aws_env_options() -> Vec<(AmazonS3ConfigKey, String)> {
    std::env::vars_os()
        .filter_map(|(os_key, os_value)| {
            let key = os_key.to_str()?;
            let value = os_value.to_str()?;
            if !key.starts_with("AWS_") {
                return None;
            }
            let config_key = key.to_ascii_lowercase().parse().ok()?;
            Some((config_key, value.to_string()))
        })
        .collect()
}

#[async_trait]
impl BlobMirror for ObjectStoreMirror {
    async fn put(&self, cid: &Cid, dir: &Path) -> Result<usize> {
        let root = dir.to_path_buf();
        let files = tokio::task::spawn_blocking(move || list_files(&root))
            .await
            .map_err(|e| Error::Internal(format!("blob listing task failed: {}", e)))??;

        for (relative, absolute) in &files {
            let data = tokio::fs::read(absolute).await?;
            let location = self.object_path(cid, relative);
            self.store
                .put(&location, PutPayload::from(data))
                .await
                .map_err(|e| Error::Store(format!("cannot mirror {}: {}", location, e)))?;
            debug!(cid = %cid, key = %location, "Mirrored blob");
        }

        info!(cid = %cid, files = files.len(), "Mirrored object tree");
        Ok(files.len())
    }
}

fn list_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Store(format!("cannot walk {}: {}", dir.display(), e)))?;
        if entry.file_type().is_file() {
            files.push((relative_key(dir, entry.path())?, entry.into_path()));
        }
    }
    Ok(files)
}
