//! Index commit
//!
//! Turns a parsed index document into an arc, pin or pinned-arc row.

use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;
use walkdir::WalkDir;
use wos_common::db::FileEntry;
use wos_common::{Error, Result};

use super::content_store::relative_key;
use crate::db::objects;
use crate::models::{Cid, IndexDocument, ObjectKind};

/// Row written by an index commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommittedObject {
    Arc { id: i64 },
    Pin { id: i64 },
    PinnedArc { id: i64, arc_id: i64, pin_id: i64 },
}

#[derive(Debug, Clone)]
pub struct ObjectIndexer {
    pool: SqlitePool,
    index_filename: String,
    public_base_url: Option<String>,
}

impl ObjectIndexer {
    pub fn new(pool: SqlitePool, index_filename: String, public_base_url: Option<String>) -> Self {
        Self {
            pool,
            index_filename,
            public_base_url,
        }
    }

    pub fn index_filename(&self) -> &str {
        &self.index_filename
    }

    /// Commit the index document found in an expanded object tree
    pub async fn commit_tree(&self, cid: &Cid, dir: &Path) -> Result<CommittedObject> {
        let body = tokio::fs::read_to_string(dir.join(&self.index_filename))
            .await
            .map_err(|e| {
                Error::Validation(format!("cannot read {}: {}", self.index_filename, e))
            })?;

        let root = dir.to_path_buf();
        let files = tokio::task::spawn_blocking(move || files_manifest(&root))
            .await
            .map_err(|e| Error::Internal(format!("manifest task failed: {}", e)))??;

        self.commit_document(cid, &body, Some(files)).await
    }

    /// Commit a document under `cid`
    ///
    /// A pinned arc must reference an existing arc and an existing pin;
    /// otherwise nothing is written and the matching not-found error returns.
    pub async fn commit_document(
        &self,
        cid: &Cid,
        body: &str,
        files: Option<Vec<FileEntry>>,
    ) -> Result<CommittedObject> {
        let document = IndexDocument::parse(body)?;
        let cover = resolve_cover_image_uri(
            self.public_base_url.as_deref(),
            cid,
            document.cover_image_uri.as_deref(),
        );
        let fields = document.to_fields(cover, files);

        let committed = match &document.kind {
            ObjectKind::Arc => CommittedObject::Arc {
                id: objects::insert_arc(&self.pool, cid, &fields).await?,
            },
            ObjectKind::Pin { location } => CommittedObject::Pin {
                id: objects::insert_pin(&self.pool, cid, &fields, location).await?,
            },
            ObjectKind::PinnedArc {
                arc_selector,
                pin_selector,
            } => {
                if arc_selector == cid || pin_selector == cid {
                    return Err(Error::Validation(format!(
                        "pinned arc {} cannot reference itself",
                        cid
                    )));
                }
                let arc = objects::find_arc_by_cid(&self.pool, arc_selector)
                    .await?
                    .ok_or_else(|| Error::ArcNotFound(arc_selector.to_string()))?;
                let pin = objects::find_pin_by_cid(&self.pool, pin_selector)
                    .await?
                    .ok_or_else(|| Error::PinNotFound(pin_selector.to_string()))?;
                let id =
                    objects::insert_pinned_arc(&self.pool, cid, &fields, arc.id, pin.id).await?;
                CommittedObject::PinnedArc {
                    id,
                    arc_id: arc.id,
                    pin_id: pin.id,
                }
            }
        };

        info!(cid = %cid, kind = document.kind.name(), name = %document.metadata.name, "Indexed object");
        Ok(committed)
    }
}

/// Public URL of the cover image
///
/// Absolute http(s) references are kept. Relative references resolve to
/// `<base>/<cid>/<path>` when a public base URL is configured and are kept
/// verbatim otherwise.
pub fn resolve_cover_image_uri(base: Option<&str>, cid: &Cid, raw: Option<&str>) -> String {
    let Some(raw) = raw.filter(|r| !r.is_empty()) else {
        return String::new();
    };
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return raw.to_string();
    }
    match base {
        Some(base) => format!(
            "{}/{}/{}",
            base.trim_end_matches('/'),
            cid,
            raw.trim_start_matches("./").trim_start_matches('/')
        ),
        None => raw.to_string(),
    }
}

/// Regular files of a tree with their sizes, sorted by path
pub fn files_manifest(dir: &Path) -> Result<Vec<FileEntry>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Store(format!("cannot walk {}: {}", dir.display(), e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let size = entry
            .metadata()
            .map_err(|e| Error::Store(format!("cannot stat {}: {}", entry.path().display(), e)))?
            .len();
        files.push(FileEntry {
            path: relative_key(dir, entry.path())?,
            size,
        });
    }
    Ok(files)
}
