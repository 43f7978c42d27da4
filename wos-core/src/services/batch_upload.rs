//! Batch upload sessions
//!
//! A session owns one staging directory. Clients add files to it over any
//! number of requests and finalize it once; finalize runs the ingestion
//! pipeline over the accumulated tree and always ends the session.
//!
//! Accumulate holds the session's lock shared and finalize holds it
//! exclusively, so a finalize never observes a half-written file and a
//! write never lands after the directory is gone.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use wos_common::db::{MediaUpload, MediaUploadStatus};
use wos_common::{Error, Result};

use super::ingest::IngestPipeline;
use super::staging::{normalize_relative_path, StagingArea};
use crate::db::media_uploads;
use crate::models::Cid;

const TOKEN_BYTES: usize = 32;

/// Outcome of adding one file to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accumulated {
    Stored { path: String },
    Skipped { path: String, reason: String },
}

pub struct BatchUploadManager {
    pool: SqlitePool,
    staging: StagingArea,
    pipeline: Arc<IngestPipeline>,
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl BatchUploadManager {
    pub fn new(pool: SqlitePool, staging: StagingArea, pipeline: Arc<IngestPipeline>) -> Self {
        Self {
            pool,
            staging,
            pipeline,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Open a session and return its token
    pub async fn begin(&self) -> Result<String> {
        let path = self.staging.create()?.keep();
        let token = new_token();

        let path_str = path.to_string_lossy().into_owned();
        if let Err(e) = media_uploads::insert_session(&self.pool, &token, &path_str).await {
            let _ = self.staging.destroy_async(&path).await;
            return Err(e);
        }

        info!(session = %token, path = %path.display(), "Batch upload session started");
        Ok(token)
    }

    /// Enabled session for `token`, or NotFound
    pub async fn enabled_session(&self, token: &str) -> Result<MediaUpload> {
        match media_uploads::find_session(&self.pool, token).await? {
            Some(session) if session.status == MediaUploadStatus::Enabled => Ok(session),
            _ => Err(Error::NotFound(format!("upload session {}", token))),
        }
    }

    /// Write one file into the session directory
    ///
    /// `relative_path` (leading `/` allowed) places the file; without it the
    /// final component of `file_name` is used. Paths that would escape the
    /// session directory are logged and skipped.
    pub async fn accumulate(
        &self,
        token: &str,
        relative_path: Option<&str>,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Accumulated> {
        self.enabled_session(token).await?;
        let lock = self.session_lock(token);
        let outcome = {
            let _shared = lock.read().await;
            // Finalize may have completed while we waited
            match self.enabled_session(token).await {
                Ok(session) => {
                    self.write_entry(token, &session, relative_path, file_name, bytes)
                        .await
                }
                Err(e) => Err(e),
            }
        };
        self.release_if_idle(token, lock);
        outcome
    }

    async fn write_entry(
        &self,
        token: &str,
        session: &MediaUpload,
        relative_path: Option<&str>,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Accumulated> {
        let requested = relative_path
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(file_name)
            .to_string();

        let relative = match relative_path.filter(|p| !p.trim().is_empty()) {
            Some(path) => normalize_relative_path(Path::new(path), true),
            None => default_file_name(file_name),
        };
        let relative = match relative {
            Ok(relative) => relative,
            Err(e) => {
                warn!(session = %token, path = %requested, error = %e, "Skipping upload entry");
                return Ok(Accumulated::Skipped {
                    path: requested,
                    reason: e.to_string(),
                });
            }
        };

        let target = PathBuf::from(&session.path).join(&relative);
        if let Some(parent) = target.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(session = %token, path = %requested, error = %e, "Skipping upload entry");
                return Ok(Accumulated::Skipped {
                    path: requested,
                    reason: format!("cannot create directory: {}", e),
                });
            }
        }

        tokio::fs::write(&target, bytes).await.map_err(|e| {
            Error::Resource(format!("cannot write {}: {}", target.display(), e))
        })?;

        let stored = relative.to_string_lossy().replace('\\', "/");
        info!(session = %token, path = %stored, size = bytes.len(), "Accumulated upload entry");
        Ok(Accumulated::Stored { path: stored })
    }

    /// Run the pipeline over the session directory and end the session
    ///
    /// The directory is destroyed and the session disabled whether or not
    /// the pipeline succeeds; a second finalize is NotFound.
    pub async fn finalize(&self, token: &str) -> Result<Cid> {
        self.enabled_session(token).await?;
        let lock = self.session_lock(token);
        let exclusive = lock.write().await;

        let session = match self.enabled_session(token).await {
            Ok(session) => session,
            Err(e) => {
                drop(exclusive);
                self.release_lock(token);
                return Err(e);
            }
        };

        let dir = PathBuf::from(&session.path);
        let result = self.pipeline.ingest_directory(&dir).await;

        if let Err(e) = self.staging.destroy_async(&dir).await {
            warn!(session = %token, error = %e, "Failed to remove session directory");
        }
        let disabled =
            media_uploads::set_status(&self.pool, token, MediaUploadStatus::Disabled).await;

        drop(exclusive);
        self.release_lock(token);

        match (result, disabled) {
            (Ok(cid), Ok(_)) => {
                info!(session = %token, cid = %cid, "Batch upload session finalized");
                Ok(cid)
            }
            (Err(e), _) => {
                info!(session = %token, error = %e, "Batch upload session ended without ingestion");
                Err(e)
            }
            (Ok(cid), Err(e)) => {
                error!(session = %token, cid = %cid, error = %e, "Cannot disable finalized session");
                Err(e)
            }
        }
    }

    fn session_lock(&self, token: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(token.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    fn release_lock(&self, token: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.remove(token);
    }

    /// Drop the map entry for `token` when `lock` is its only other holder
    fn release_if_idle(&self, token: &str, lock: Arc<RwLock<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let idle = locks
            .get(token)
            .is_some_and(|held| Arc::ptr_eq(held, &lock) && Arc::strong_count(&lock) == 2);
        if idle {
            locks.remove(token);
        }
    }
}

fn new_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

fn default_file_name(file_name: &str) -> Result<PathBuf> {
    Path::new(file_name)
        .file_name()
        .filter(|name| !name.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| Error::Validation(format!("unusable file name: {:?}", file_name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::objects;
    use crate::services::ContentStore;
    use crate::test_support::{arc_document, TestEnv};
    use std::time::Duration;

    fn manager(env: &TestEnv) -> BatchUploadManager {
        BatchUploadManager::new(env.pool.clone(), env.staging(), Arc::new(env.pipeline()))
    }

    #[test]
    fn test_tokens_are_url_safe_and_distinct() {
        let a = new_token();
        let b = new_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[tokio::test]
    async fn test_session_flow() {
        let env = TestEnv::new().await;
        let manager = manager(&env);

        let token = manager.begin().await.unwrap();
        let session = manager.enabled_session(&token).await.unwrap();
        let dir = PathBuf::from(&session.path);
        assert!(dir.is_dir());

        let doc = arc_document("Batch");
        let stored = manager
            .accumulate(&token, Some("/index.json"), "index.json", doc.as_bytes())
            .await
            .unwrap();
        assert_eq!(stored, Accumulated::Stored { path: "index.json".to_string() });
        manager
            .accumulate(&token, Some("media/a.txt"), "a.txt", b"hello")
            .await
            .unwrap();
        manager
            .accumulate(&token, None, "uploads/notes.txt", b"notes")
            .await
            .unwrap();
        assert!(dir.join("notes.txt").exists());

        let cid = manager.finalize(&token).await.unwrap();
        assert!(!dir.exists());
        assert!(objects::find_arc_by_cid(&env.pool, &cid).await.unwrap().is_some());

        // Every file sits at its submitted path in the content-addressed tree
        let out = tempfile::TempDir::new().unwrap();
        manager
            .pipeline
            .content_store()
            .get(&cid, out.path())
            .await
            .unwrap();
        assert_eq!(std::fs::read(out.path().join("index.json")).unwrap(), doc.as_bytes());
        assert_eq!(std::fs::read(out.path().join("media/a.txt")).unwrap(), b"hello");
        assert_eq!(std::fs::read(out.path().join("notes.txt")).unwrap(), b"notes");

        // Session ended
        assert!(matches!(manager.finalize(&token).await, Err(Error::NotFound(_))));
        assert!(matches!(
            manager.accumulate(&token, None, "late.txt", b"x").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_traversal_is_skipped() {
        let env = TestEnv::new().await;
        let manager = manager(&env);
        let token = manager.begin().await.unwrap();
        let session = manager.enabled_session(&token).await.unwrap();

        let result = manager
            .accumulate(&token, Some("../../escape.txt"), "escape.txt", b"x")
            .await
            .unwrap();
        assert!(matches!(result, Accumulated::Skipped { .. }));

        let parent = PathBuf::from(&session.path).parent().unwrap().to_path_buf();
        assert!(!parent.join("escape.txt").exists());
        assert!(!parent.parent().unwrap().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn test_failed_pipeline_still_ends_session() {
        let env = TestEnv::new().await;
        let manager = manager(&env);
        let token = manager.begin().await.unwrap();
        let dir = PathBuf::from(&manager.enabled_session(&token).await.unwrap().path);

        manager.accumulate(&token, None, "notes.txt", b"no index").await.unwrap();

        assert!(matches!(manager.finalize(&token).await, Err(Error::Validation(_))));
        assert!(!dir.exists());
        assert!(matches!(manager.enabled_session(&token).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let env = TestEnv::new().await;
        let manager = manager(&env);

        assert!(matches!(
            manager.accumulate("nope", None, "a.txt", b"x").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(manager.finalize("nope").await, Err(Error::NotFound(_))));
        assert!(manager.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_finalize_ingests_once() {
        let env = TestEnv::new().await;
        let manager = Arc::new(manager(&env));
        let token = manager.begin().await.unwrap();
        manager
            .accumulate(&token, Some("index.json"), "index.json", arc_document("Once").as_bytes())
            .await
            .unwrap();

        let (a, b) = tokio::join!(manager.finalize(&token), manager.finalize(&token));
        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);
        assert_eq!(
            objects::count_rows(&env.pool, objects::ObjectTable::Arcs).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_accumulate_leaves_no_lock_entry_behind() {
        let env = TestEnv::new().await;
        let manager = Arc::new(manager(&env));
        let token = manager.begin().await.unwrap();

        manager.accumulate(&token, None, "a.txt", b"a").await.unwrap();
        assert!(manager.locks.lock().unwrap().is_empty());

        // Session ends while an accumulate waits for the lock
        let lock = manager.session_lock(&token);
        let exclusive = lock.write().await;
        let waiting = {
            let manager = manager.clone();
            let token = token.clone();
            tokio::spawn(async move { manager.accumulate(&token, None, "b.txt", b"b").await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        media_uploads::set_status(&env.pool, &token, MediaUploadStatus::Disabled)
            .await
            .unwrap();
        drop(exclusive);
        drop(lock);

        assert!(matches!(waiting.await.unwrap(), Err(Error::NotFound(_))));
        assert!(manager.locks.lock().unwrap().is_empty());
    }
}
