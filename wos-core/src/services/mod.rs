//! Services for wos-core
//!
//! Storage backends, the ingestion pipeline, batch sessions and search.

pub mod archive;
pub mod batch_upload;
pub mod blob_mirror;
pub mod content_store;
pub mod indexer;
pub mod ingest;
pub mod search;
pub mod staging;
pub mod thumbnails;

pub use batch_upload::{Accumulated, BatchUploadManager};
pub use blob_mirror::{BlobMirror, ObjectStoreMirror};
pub use content_store::{ContentStore, LocalContentStore};
pub use indexer::{CommittedObject, ObjectIndexer};
pub use ingest::{CompensationHook, IngestPipeline, LogOrphans, PipelineBackends, PipelineStep};
pub use search::{MatchExpression, SearchEvaluator, SearchResult, SEARCH_RADIUS_METERS};
pub use staging::{StagingArea, StagingDir};
pub use thumbnails::{ImageThumbnailer, ThumbnailGenerator};
