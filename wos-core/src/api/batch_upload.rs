//! Batch upload session endpoints

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    routing::{post, put},
    Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;

use super::objects::CidResponse;
use crate::error::ApiResult;
use crate::services::Accumulated;
use crate::AppState;

const FILE_FIELD: &str = "file";
const PATH_FIELD_PREFIX: &str = "path";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginResponse {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct SkippedEntry {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct AccumulateResponse {
    pub stored: Vec<String>,
    pub skipped: Vec<SkippedEntry>,
}

/// POST /object/batchUpload
pub async fn begin_session(State(state): State<AppState>) -> ApiResult<Json<BeginResponse>> {
    let session_id = state.sessions.begin().await?;
    Ok(Json(BeginResponse { session_id }))
}

/// POST /object/batchUpload/multipart/:session_id
///
/// Repeated `file` fields; `path<n>` names the relative path of the n-th
/// file (zero based). Files without a path use their own file name.
pub async fn upload_files(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Json<AccumulateResponse>> {
    state.sessions.enabled_session(&session_id).await?;

    let mut files: Vec<(String, Bytes)> = Vec::new();
    let mut paths: HashMap<usize, String> = HashMap::new();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == FILE_FIELD {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await?;
            files.push((file_name, bytes));
        } else if let Some(index) = name
            .strip_prefix(PATH_FIELD_PREFIX)
            .and_then(|n| n.parse::<usize>().ok())
        {
            paths.insert(index, field.text().await?);
        }
    }

    let mut response = AccumulateResponse::default();
    for (index, (file_name, bytes)) in files.iter().enumerate() {
        let outcome = state
            .sessions
            .accumulate(&session_id, paths.get(&index).map(String::as_str), file_name, bytes)
            .await?;
        match outcome {
            Accumulated::Stored { path } => response.stored.push(path),
            Accumulated::Skipped { path, reason } => {
                response.skipped.push(SkippedEntry { path, reason })
            }
        }
    }

    Ok(Json(response))
}

/// PUT /object/batchUpload/:session_id
pub async fn finalize_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<CidResponse>> {
    let cid = state.sessions.finalize(&session_id).await?;
    Ok(Json(CidResponse { cid: cid.to_string() }))
}

/// Build batch upload routes
pub fn batch_upload_routes() -> Router<AppState> {
    Router::new()
        .route("/object/batchUpload", post(begin_session))
        .route("/object/batchUpload/multipart/:session_id", post(upload_files))
        .route("/object/batchUpload/:session_id", put(finalize_session))
}
