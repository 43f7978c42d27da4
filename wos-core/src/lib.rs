//! wos-core library interface
//!
//! Object ingestion pipeline, batch upload sessions, search and the HTTP
//! surface over them. Exposed as a library for integration testing.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

#[cfg(test)]
pub(crate) mod test_support;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use wos_common::config::ServiceConfig;

use crate::services::{
    BatchUploadManager, IngestPipeline, ObjectIndexer, PipelineBackends, SearchEvaluator,
    StagingArea,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub config: Arc<ServiceConfig>,
    pub pipeline: Arc<IngestPipeline>,
    pub sessions: Arc<BatchUploadManager>,
    pub search: SearchEvaluator,
    pub staging: StagingArea,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: Arc<ServiceConfig>, backends: PipelineBackends) -> Self {
        let staging = StagingArea::new(&config.media.upload_temp_path);
        let indexer = ObjectIndexer::new(
            db.clone(),
            config.media.index_filename.clone(),
            config.blob_mirror.public_base_url.clone(),
        );
        let pipeline = Arc::new(IngestPipeline::new(
            backends,
            indexer,
            staging.clone(),
            config.store_deadline(),
        ));
        let sessions = Arc::new(BatchUploadManager::new(
            db.clone(),
            staging.clone(),
            pipeline.clone(),
        ));

        Self {
            search: SearchEvaluator::new(db.clone()),
            db,
            config,
            pipeline,
            sessions,
            staging,
            startup_time: Utc::now(),
        }
    }

    /// State with the backends named by `config`
    pub fn from_config(db: SqlitePool, config: Arc<ServiceConfig>) -> wos_common::Result<Self> {
        let backends = PipelineBackends::from_config(&config)?;
        Ok(Self::new(db, config, backends))
    }
}

/// Build application router
///
/// Object routes live under `/<api_version>`; `/health` stays at the root.
pub fn build_router(state: AppState) -> Router {
    let prefix = format!("/{}", state.config.server.api_version.trim_matches('/'));
    let body_limit = state.config.server.max_body_bytes;

    let versioned = Router::new()
        .merge(api::ping_routes())
        .merge(api::object_routes())
        .merge(api::batch_upload_routes())
        .merge(api::search_routes())
        .merge(api::layer_routes());

    Router::new()
        .nest(&prefix, versioned)
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
