//! Ingestion pipeline
//!
//! Every entry point converges on [`IngestPipeline::ingest_directory`]:
//! content commit, index commit, thumbnails, blob mirror, in that order.
//! The first failing step aborts the rest. Steps already committed are not
//! rolled back; the [`CompensationHook`] is told which object was left
//! behind.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use wos_common::config::ServiceConfig;
use wos_common::{Error, Result};

use super::archive;
use super::blob_mirror::{BlobMirror, ObjectStoreMirror};
use super::content_store::{ContentStore, LocalContentStore};
use super::indexer::{CommittedObject, ObjectIndexer};
use super::staging::StagingArea;
use super::thumbnails::{ImageThumbnailer, ThumbnailGenerator};
use crate::models::Cid;

/// Pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    ContentCommit,
    IndexCommit,
    Thumbnails,
    BlobMirror,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStep::ContentCommit => "content_commit",
            PipelineStep::IndexCommit => "index_commit",
            PipelineStep::Thumbnails => "thumbnails",
            PipelineStep::BlobMirror => "blob_mirror",
        };
        f.write_str(name)
    }
}

/// Notified when a step fails after content was committed
#[async_trait]
pub trait CompensationHook: Send + Sync {
    async fn step_failed(
        &self,
        cid: &Cid,
        step: PipelineStep,
        committed: Option<CommittedObject>,
        error: &Error,
    );
}

/// Default hook: record the orphan in the log
#[derive(Debug, Default)]
pub struct LogOrphans;

#[async_trait]
impl CompensationHook for LogOrphans {
    async fn step_failed(
        &self,
        cid: &Cid,
        step: PipelineStep,
        committed: Option<CommittedObject>,
        error: &Error,
    ) {
        warn!(
            cid = %cid,
            step = %step,
            committed = ?committed,
            error = %error,
            "Ingestion aborted after partial commit"
        );
    }
}

/// Backends used by the pipeline
#[derive(Clone)]
pub struct PipelineBackends {
    pub content_store: Arc<dyn ContentStore>,
    pub blob_mirror: Arc<dyn BlobMirror>,
    pub thumbnails: Arc<dyn ThumbnailGenerator>,
}

impl PipelineBackends {
    /// Local content store, configured blob mirror, image thumbnailer
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        Ok(Self {
            content_store: Arc::new(LocalContentStore::new(&config.content_store.path)),
            blob_mirror: Arc::new(ObjectStoreMirror::from_url(&config.blob_mirror.url)?),
            thumbnails: Arc::new(ImageThumbnailer::new(config.thumbnails.max_edge)),
        })
    }
}

pub struct IngestPipeline {
    backends: PipelineBackends,
    indexer: ObjectIndexer,
    staging: StagingArea,
    compensation: Arc<dyn CompensationHook>,
    deadline: Duration,
}

impl IngestPipeline {
    pub fn new(
        backends: PipelineBackends,
        indexer: ObjectIndexer,
        staging: StagingArea,
        deadline: Duration,
    ) -> Self {
        Self {
            backends,
            indexer,
            staging,
            compensation: Arc::new(LogOrphans),
            deadline,
        }
    }

    pub fn with_compensation(mut self, hook: Arc<dyn CompensationHook>) -> Self {
        self.compensation = hook;
        self
    }

    pub fn content_store(&self) -> &Arc<dyn ContentStore> {
        &self.backends.content_store
    }

    /// Ingest an uncompressed tar archive
    pub async fn ingest_archive<B>(&self, bytes: B) -> Result<Cid>
    where
        B: AsRef<[u8]> + Send + 'static,
    {
        let staging = self.staging.create()?;
        let dest = staging.path().to_path_buf();
        tokio::task::spawn_blocking(move || archive::expand_archive(bytes.as_ref(), &dest))
            .await
            .map_err(|e| Error::Internal(format!("archive task failed: {}", e)))??;

        let cid = self.ingest_directory(staging.path()).await?;
        info!(cid = %cid, "Ingested archive");
        Ok(cid)
    }

    /// Ingest a bare index document
    pub async fn ingest_index_document(&self, body: &[u8]) -> Result<Cid> {
        let text = std::str::from_utf8(body)
            .map_err(|e| Error::Validation(format!("index document is not UTF-8: {}", e)))?;

        let staging = self.staging.create()?;
        let index_path = staging.path().join(self.indexer.index_filename());
        tokio::fs::write(&index_path, text)
            .await
            .map_err(|e| Error::Resource(format!("cannot stage index document: {}", e)))?;

        let cid = self.ingest_directory(staging.path()).await?;
        info!(cid = %cid, "Ingested index document");
        Ok(cid)
    }

    /// Run the pipeline over an expanded object tree
    pub async fn ingest_directory(&self, dir: &Path) -> Result<Cid> {
        let index_path = dir.join(self.indexer.index_filename());
        if !tokio::fs::try_exists(&index_path).await.unwrap_or(false) {
            return Err(Error::Validation(format!(
                "object tree has no {}",
                self.indexer.index_filename()
            )));
        }

        let cid = self
            .bounded(PipelineStep::ContentCommit, self.backends.content_store.put(dir))
            .await
            .inspect_err(|e| error!(step = %PipelineStep::ContentCommit, error = %e, "Ingestion failed"))?;

        let committed = match self
            .bounded(PipelineStep::IndexCommit, self.indexer.commit_tree(&cid, dir))
            .await
        {
            Ok(committed) => committed,
            Err(e) => return Err(self.abort(&cid, PipelineStep::IndexCommit, None, e).await),
        };

        if let Err(e) = self
            .bounded(PipelineStep::Thumbnails, self.backends.thumbnails.process(dir))
            .await
        {
            return Err(self.abort(&cid, PipelineStep::Thumbnails, Some(committed), e).await);
        }

        if let Err(e) = self
            .bounded(PipelineStep::BlobMirror, self.backends.blob_mirror.put(&cid, dir))
            .await
        {
            let e = match e {
                Error::Store(_) => e,
                other => Error::Store(other.to_string()),
            };
            return Err(self.abort(&cid, PipelineStep::BlobMirror, Some(committed), e).await);
        }

        Ok(cid)
    }

    async fn abort(
        &self,
        cid: &Cid,
        step: PipelineStep,
        committed: Option<CommittedObject>,
        e: Error,
    ) -> Error {
        if e.is_client_error() || e.is_not_found() {
            info!(cid = %cid, step = %step, error = %e, "Ingestion rejected");
        } else {
            error!(cid = %cid, step = %step, error = %e, "Ingestion failed");
        }
        self.compensation.step_failed(cid, step, committed, &e).await;
        e
    }

    async fn bounded<T, F>(&self, step: PipelineStep, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Store(format!(
                "{} exceeded deadline of {:?}",
                step, self.deadline
            ))),
        }
    }
}
