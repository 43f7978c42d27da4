//! Object ingestion and retrieval endpoints

use axum::{
    body::{Body, Bytes},
    extract::{Multipart, Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::info;
use wos_common::Error;

use crate::db::objects;
use crate::error::{ApiError, ApiResult};
use crate::models::Cid;
use crate::services::archive;
use crate::AppState;

const ARCHIVE_FIELD: &str = "file";

/// Ingestion response
#[derive(Debug, Serialize)]
pub struct CidResponse {
    pub cid: String,
}

/// POST /object/archive/multipart
///
/// Multipart field `file` carries an uncompressed tar of the object tree.
pub async fn upload_archive(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<CidResponse>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(ARCHIVE_FIELD) {
            continue;
        }
        let bytes = field.bytes().await?;
        info!(size = bytes.len(), "Received archive upload");

        let cid = state.pipeline.ingest_archive(bytes).await?;
        return Ok(Json(CidResponse { cid: cid.to_string() }));
    }

    Err(ApiError::BadRequest(format!(
        "multipart field '{}' is required",
        ARCHIVE_FIELD
    )))
}

/// GET /object/archive/:cid
///
/// Re-packages the stored tree as a tar archive.
pub async fn download_archive(
    State(state): State<AppState>,
    Path(cid): Path<String>,
) -> ApiResult<Response> {
    let cid = Cid::parse(&cid)?;
    let staging = state.staging.create()?;
    state.pipeline.content_store().get(&cid, staging.path()).await?;

    let tar = tokio::task::spawn_blocking(move || archive::pack_directory(staging.path()))
        .await
        .map_err(|e| ApiError::Internal(format!("archive task failed: {}", e)))??;

    let disposition = format!("attachment; filename=\"{}.tar\"", cid);
    Ok((
        [
            (header::CONTENT_TYPE, "application/x-tar".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(tar),
    )
        .into_response())
}

/// POST /object/index
///
/// Raw index document body, ingested as a single-file object tree.
pub async fn upload_index(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<CidResponse>> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("index document body is empty".to_string()));
    }
    let cid = state.pipeline.ingest_index_document(&body).await?;
    Ok(Json(CidResponse { cid: cid.to_string() }))
}

/// GET /object/:cid/index
///
/// Returns the index document exactly as it was submitted.
pub async fn get_index(
    State(state): State<AppState>,
    Path(cid): Path<String>,
) -> ApiResult<Response> {
    let cid = Cid::parse(&cid)?;
    let body = objects::find_index_body(&state.db, &cid)
        .await?
        .ok_or_else(|| Error::NotFound(format!("object {}", cid)))?;

    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// Build object routes
pub fn object_routes() -> Router<AppState> {
    Router::new()
        .route("/object/archive/multipart", post(upload_archive))
        .route("/object/archive/:cid", get(download_archive))
        .route("/object/index", post(upload_index))
        .route("/object/:cid/index", get(get_index))
}
