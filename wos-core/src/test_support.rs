//! Shared fixtures for unit tests

use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wos_common::config::ServiceConfig;
use wos_common::db::init_database;

use crate::services::{
    BlobMirror, ImageThumbnailer, IngestPipeline, LocalContentStore, ObjectIndexer,
    ObjectStoreMirror, PipelineBackends, StagingArea,
};

/// Temporary root holding a database, staging, content and blob directories
pub struct TestEnv {
    pub root: TempDir,
    pub pool: SqlitePool,
    pub config: ServiceConfig,
}

impl TestEnv {
    pub async fn new() -> Self {
        let root = TempDir::new().unwrap();
        let config = ServiceConfig::with_root(root.path());
        let pool = init_database(&config.database.path).await.unwrap();
        Self { root, pool, config }
    }

    pub fn staging(&self) -> StagingArea {
        StagingArea::new(&self.config.media.upload_temp_path)
    }

    pub fn content_root(&self) -> PathBuf {
        self.config.content_store.path.clone()
    }

    pub fn blob_root(&self) -> PathBuf {
        self.root.path().join("blobs")
    }

    pub fn pipeline(&self) -> IngestPipeline {
        let mirror = ObjectStoreMirror::from_url(&self.config.blob_mirror.url).unwrap();
        self.pipeline_with_mirror(Arc::new(mirror), self.config.store_deadline())
    }

    pub fn pipeline_with_mirror(
        &self,
        blob_mirror: Arc<dyn BlobMirror>,
        deadline: Duration,
    ) -> IngestPipeline {
        let backends = PipelineBackends {
            content_store: Arc::new(LocalContentStore::new(self.content_root())),
            blob_mirror,
            thumbnails: Arc::new(ImageThumbnailer::new(self.config.thumbnails.max_edge)),
        };
        let indexer = ObjectIndexer::new(
            self.pool.clone(),
            self.config.media.index_filename.clone(),
            None,
        );
        IngestPipeline::new(backends, indexer, self.staging(), deadline)
    }
}

fn document(kind: &str, name: &str, location: Option<(f64, f64)>, spec: &str) -> String {
    let location = location
        .map(|(lat, lon)| format!(r#","location":{{"lat":{},"lon":{}}}"#, lat, lon))
        .unwrap_or_default();
    format!(
        r#"{{"apiVersion":"v1","kind":"{kind}","metadata":{{"name":"{name}","createdAt":"2024-03-01T10:00:00Z","description":"test object","owner":{{"id":"u-1","provider":"local"}}{location}}},"spec":{spec}}}"#
    )
}

pub fn arc_document(name: &str) -> String {
    document("arc", name, None, r#"{"coverImageUri":"cover.png"}"#)
}

pub fn pin_document(lat: f64, lon: f64) -> String {
    document("pin", "Pin", Some((lat, lon)), "{}")
}

pub fn pinned_arc_document(arc_cid: &str, pin_cid: &str) -> String {
    document(
        "pinnedArc",
        "Pinned",
        None,
        &format!(
            r#"{{"arcSelector":{{"cid":"{}"}},"pinSelector":{{"cid":"{}"}}}}"#,
            arc_cid, pin_cid
        ),
    )
}

/// Uncompressed tar of regular files
pub fn tar_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap()
}
